//! Backend clients.
//!
//! # Responsibilities
//! - Deliver one write to one storage node, single attempt, bounded by a timeout
//! - Probe node liveness
//! - Classify results into accepted / rejected / unavailable
//!
//! # Design Decisions
//! - No retries here; the retry buffer owns redelivery
//! - 4xx (except 408/429) is a permanent rejection, everything else transient
//! - One pooled hyper client shared by every backend

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use futures_util::future::BoxFuture;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use url::Url;

use crate::config::{BackendConfig, ConfigError};
use crate::write::{Destination, Outcome, WriteRequest};

/// Largest response body kept as a rejection reason.
const MAX_REASON_BYTES: usize = 4 * 1024;

/// Capability to deliver writes to a single backend.
pub trait BackendClient: Send + Sync + fmt::Debug {
    /// Send one write. Never retries.
    fn send<'a>(&'a self, write: &'a WriteRequest, timeout: Duration) -> BoxFuture<'a, Outcome>;

    /// Liveness probe. `Accepted` means the node is reachable and healthy.
    fn probe(&self, timeout: Duration) -> BoxFuture<'_, Outcome>;
}

/// Builds clients for configured backends.
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn BackendClient>, ConfigError>;
}

/// How a backend HTTP status is treated.
pub fn classify_status(status: StatusCode) -> StatusClass {
    if status.is_success() {
        StatusClass::Accepted
    } else if status == StatusCode::REQUEST_TIMEOUT || status == StatusCode::TOO_MANY_REQUESTS {
        StatusClass::Unavailable
    } else if status.is_client_error() {
        StatusClass::Rejected
    } else {
        StatusClass::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Accepted,
    Rejected,
    Unavailable,
}

/// HTTP client for line-protocol storage nodes.
#[derive(Clone)]
pub struct HttpBackendClient {
    name: String,
    base_url: Url,
    probe_path: String,
    client: Client<HttpConnector, Body>,
}

impl fmt::Debug for HttpBackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpBackendClient")
            .field("name", &self.name)
            .field("base_url", &self.base_url.as_str())
            .finish()
    }
}

impl HttpBackendClient {
    pub fn new(config: &BackendConfig, client: Client<HttpConnector, Body>) -> Result<Self, ConfigError> {
        let base_url = Url::parse(&config.address).map_err(|e| ConfigError::Client {
            backend: config.name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            name: config.name.clone(),
            base_url,
            probe_path: config.probe_path.clone(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!(
            "{}/{}",
            self.base_url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url
    }

    /// Write endpoint for a destination, e.g. `/write?db=telegraf&precision=ms`.
    pub fn write_url(&self, destination: &Destination) -> Url {
        let mut url = self.endpoint("write");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("db", &destination.database);
            if let Some(rp) = &destination.retention_policy {
                query.append_pair("rp", rp);
            }
            query.append_pair("precision", destination.precision.as_str());
        }
        url
    }

    async fn post(&self, write: &WriteRequest) -> Outcome {
        let url = self.write_url(&write.destination);
        let request = match Request::builder()
            .method(Method::POST)
            .uri(url.as_str())
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .header(header::USER_AGENT, "tsdb-relay")
            .body(Body::from(write.payload.clone()))
        {
            Ok(req) => req,
            Err(e) => return Outcome::Unavailable(format!("failed to build request: {}", e)),
        };

        let response = match self.client.request(request).await {
            Ok(response) => response,
            Err(e) => return Outcome::Unavailable(format!("connection error: {}", e)),
        };

        let status = response.status();
        match classify_status(status) {
            StatusClass::Accepted => Outcome::Accepted,
            StatusClass::Unavailable => Outcome::Unavailable(format!("status {}", status)),
            StatusClass::Rejected => {
                let body = axum::body::to_bytes(Body::new(response.into_body()), MAX_REASON_BYTES)
                    .await
                    .map(|b| String::from_utf8_lossy(&b).trim().to_string())
                    .unwrap_or_default();
                if body.is_empty() {
                    Outcome::Rejected(format!("status {}", status))
                } else {
                    Outcome::Rejected(format!("status {}: {}", status, body))
                }
            }
        }
    }

    async fn ping(&self) -> Outcome {
        let url = self.endpoint(&self.probe_path);
        let request = match Request::builder()
            .method(Method::GET)
            .uri(url.as_str())
            .header(header::USER_AGENT, "tsdb-relay-health-check")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return Outcome::Unavailable(format!("failed to build probe: {}", e)),
        };

        match self.client.request(request).await {
            Ok(response) if response.status().is_success() => Outcome::Accepted,
            Ok(response) => Outcome::Unavailable(format!("probe status {}", response.status())),
            Err(e) => Outcome::Unavailable(format!("probe connection error: {}", e)),
        }
    }
}

impl BackendClient for HttpBackendClient {
    fn send<'a>(&'a self, write: &'a WriteRequest, timeout: Duration) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            match time::timeout(timeout, self.post(write)).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Unavailable(format!("timeout after {:?}", timeout)),
            }
        })
    }

    fn probe(&self, timeout: Duration) -> BoxFuture<'_, Outcome> {
        Box::pin(async move {
            match time::timeout(timeout, self.ping()).await {
                Ok(outcome) => outcome,
                Err(_) => Outcome::Unavailable(format!("probe timeout after {:?}", timeout)),
            }
        })
    }
}

/// Factory producing [`HttpBackendClient`]s over one shared connection pool.
#[derive(Clone)]
pub struct HttpClientFactory {
    client: Client<HttpConnector, Body>,
}

impl HttpClientFactory {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self { client }
    }
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn BackendClient>, ConfigError> {
        Ok(Arc::new(HttpBackendClient::new(config, self.client.clone())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::write::Precision;

    fn client_for(address: &str) -> HttpBackendClient {
        let factory = HttpClientFactory::new();
        HttpBackendClient::new(&BackendConfig::new("a", address), factory.client).unwrap()
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::NO_CONTENT), StatusClass::Accepted);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), StatusClass::Rejected);
        assert_eq!(classify_status(StatusCode::NOT_FOUND), StatusClass::Rejected);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), StatusClass::Unavailable);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), StatusClass::Unavailable);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE), StatusClass::Unavailable);
        assert_eq!(classify_status(StatusCode::INTERNAL_SERVER_ERROR), StatusClass::Unavailable);
    }

    #[test]
    fn test_write_url() {
        let client = client_for("http://127.0.0.1:8086");
        let mut dest = Destination::new("telegraf");
        dest.precision = Precision::Ms;
        assert_eq!(
            client.write_url(&dest).as_str(),
            "http://127.0.0.1:8086/write?db=telegraf&precision=ms"
        );

        dest.retention_policy = Some("autogen".into());
        assert_eq!(
            client.write_url(&dest).as_str(),
            "http://127.0.0.1:8086/write?db=telegraf&rp=autogen&precision=ms"
        );
    }

    #[test]
    fn test_write_url_keeps_base_path() {
        let client = client_for("http://influx.local/proxy/");
        assert_eq!(
            client.write_url(&Destination::new("db")).as_str(),
            "http://influx.local/proxy/write?db=db&precision=ns"
        );
        assert_eq!(client.endpoint("/ping").as_str(), "http://influx.local/proxy/ping");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Port 1 is reserved and not listening.
        let client = client_for("http://127.0.0.1:1");
        let write = WriteRequest::new(Destination::new("db"), "cpu v=1");
        let outcome = client.send(&write, Duration::from_secs(2)).await;
        assert!(outcome.is_unavailable(), "got {:?}", outcome);
        assert!(client.probe(Duration::from_secs(2)).await.is_unavailable());
    }
}
