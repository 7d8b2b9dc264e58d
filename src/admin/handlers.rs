use axum::{extract::State, Json};

use crate::http::server::AppState;
use crate::observability::StatsSnapshot;
use crate::relay::{BackendStatus, RelayStatusReport};

pub async fn get_status(State(state): State<AppState>) -> Json<RelayStatusReport> {
    Json(state.relay.status())
}

pub async fn get_backends(State(state): State<AppState>) -> Json<Vec<BackendStatus>> {
    Json(state.relay.status().backends)
}

pub async fn get_stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.relay.stats().snapshot())
}
