//! Operational views of the relay: per-write responses and the status report.

use serde::{Serialize, Serializer};
use std::time::UNIX_EPOCH;
use uuid::Uuid;

use crate::backend::Backend;
use crate::dispatch::{GroupOutcome, RelayStatus};
use crate::error::RelayError;
use crate::health::HealthState;
use crate::observability::StatsSnapshot;

/// Result of one client write.
#[derive(Debug, Clone, Serialize)]
pub struct RelayResponse {
    pub write_id: Uuid,
    pub status: RelayStatus,
    pub groups: Vec<GroupOutcome>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RelayError>,
}

fn serialize_error<S: Serializer>(error: &Option<RelayError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Health and buffer state of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub address: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
    /// Unix seconds of the last accepted outcome.
    pub last_success: Option<u64>,
    pub buffered: usize,
    pub buffered_bytes: usize,
}

impl BackendStatus {
    pub fn new(backend: &Backend, buffered: usize, buffered_bytes: usize) -> Self {
        let health = backend.health();
        Self {
            name: backend.name.clone(),
            address: backend.address.clone(),
            state: health.state,
            consecutive_failures: health.consecutive_failures,
            last_success: health
                .last_success
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            buffered,
            buffered_bytes,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RelayStatusReport {
    pub backends: Vec<BackendStatus>,
    pub buffered_total: usize,
    pub stats: StatsSnapshot,
}

impl RelayStatusReport {
    pub fn backend(&self, name: &str) -> Option<&BackendStatus> {
        self.backends.iter().find(|b| b.name == name)
    }

    /// True when no backend is down.
    pub fn is_healthy(&self) -> bool {
        self.backends.iter().all(|b| b.state != HealthState::Down)
    }
}
