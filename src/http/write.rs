//! Listener endpoints: write ingestion, ping and health.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::dispatch::RelayStatus;
use crate::http::server::AppState;
use crate::relay::BackendStatus;
use crate::write::line_protocol::first_measurement;
use crate::write::{Destination, Precision, WriteRequest};

/// Header carrying the tenant when it is not passed in the query string.
pub const X_TENANT: &str = "x-tenant";

/// Query string of `POST /write`.
#[derive(Debug, Default, Deserialize)]
pub struct WriteParams {
    pub db: Option<String>,
    pub rp: Option<String>,
    pub precision: Option<String>,
    pub tenant: Option<String>,
}

/// Client-side error returned before the relay is involved.
#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiError {
            error: message.into(),
        }),
    )
        .into_response()
}

/// HTTP status for a relay-level result.
pub fn status_code(status: RelayStatus) -> StatusCode {
    match status {
        RelayStatus::Accepted | RelayStatus::PartiallyAccepted => StatusCode::NO_CONTENT,
        RelayStatus::Rejected => StatusCode::BAD_REQUEST,
        RelayStatus::NoRoute => StatusCode::NOT_FOUND,
        RelayStatus::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Build the routing attributes of a write from the request.
pub fn destination(params: WriteParams, headers: &HeaderMap, body: &[u8]) -> Result<Destination, String> {
    let database = params
        .db
        .filter(|db| !db.is_empty())
        .ok_or_else(|| "database is required".to_string())?;
    let precision = params
        .precision
        .as_deref()
        .unwrap_or_default()
        .parse::<Precision>()?;
    let tenant = params.tenant.filter(|t| !t.is_empty()).or_else(|| {
        headers
            .get(X_TENANT)
            .and_then(|v| v.to_str().ok())
            .filter(|t| !t.is_empty())
            .map(String::from)
    });

    Ok(Destination {
        database,
        retention_policy: params.rp.filter(|rp| !rp.is_empty()),
        tenant,
        measurement: first_measurement(body),
        precision,
    })
}

pub async fn write_handler(
    State(state): State<AppState>,
    Query(params): Query<WriteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return bad_request("empty write body");
    }
    let destination = match destination(params, &headers, &body) {
        Ok(destination) => destination,
        Err(message) => return bad_request(message),
    };

    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    let write = WriteRequest::new(destination, body);
    tracing::debug!(
        request_id = %request_id,
        write_id = %write.id,
        database = %write.destination.database,
        bytes = write.size(),
        "Write received"
    );

    let response = state.relay.write(write).await;
    let code = status_code(response.status);
    if code == StatusCode::NO_CONTENT {
        code.into_response()
    } else {
        (code, Json(response)).into_response()
    }
}

pub async fn ping_handler() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub backends: Vec<BackendStatus>,
    pub buffered_total: usize,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.relay.status();
    Json(HealthResponse {
        status: if report.is_healthy() { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        backends: report.backends,
        buffered_total: report.buffered_total,
    })
}
