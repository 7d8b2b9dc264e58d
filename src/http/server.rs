//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the listener and admin handlers
//! - Wire up middleware (tracing, body limit, request ID)
//! - Bind server to listener
//! - Hand decoded writes to the relay

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::admin::setup_admin_router;
use crate::config::{AdminConfig, RelayConfig};
use crate::http::write::{health_handler, ping_handler, write_handler};
use crate::relay::Relay;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub admin: Arc<AdminConfig>,
}

/// HTTP listener in front of the relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server for `relay`.
    pub fn new(relay: Arc<Relay>, config: &RelayConfig) -> Self {
        let state = AppState {
            relay,
            admin: Arc::new(config.admin.clone()),
        };
        let router = Self::build_router(config, state);
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &RelayConfig, state: AppState) -> Router {
        let mut router = Router::new()
            .route("/write", post(write_handler))
            .route("/ping", get(ping_handler).head(ping_handler))
            .route("/health", get(health_handler));

        if config.admin.enabled {
            router = router.merge(setup_admin_router(state.clone()));
        }

        router.with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(config.listener.max_body_bytes)),
        )
    }

    /// The router, for serving in tests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
