//! Write-path relay for time-series storage backends.

// Write path
pub mod backend;
pub mod buffer;
pub mod dispatch;
pub mod health;
pub mod relay;
pub mod routing;
pub mod write;

// Boundary
pub mod admin;
pub mod config;
pub mod http;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::schema::RelayConfig;
pub use error::RelayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::Relay;
