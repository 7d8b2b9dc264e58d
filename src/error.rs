//! Relay error taxonomy.
//!
//! # Propagation
//! ```text
//! NoRoute           → caller, nothing queued, no backend contacted
//! Rejected          → caller (data-level), never retried
//! Unavailable       → handled inside the relay via the retry buffer
//! ConsistencyNotMet → caller, unavailable members still queued
//! BufferOverflow    ┐
//! RetryExhausted    ├→ write dropped, always reported (logs, metrics, stats)
//! RetentionExpired  ┘
//! ```

use std::time::Duration;
use thiserror::Error;

/// Which bound of the retry buffer refused an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowScope {
    /// Per-backend entry limit.
    BackendEntries,
    /// Per-backend payload byte limit.
    BackendBytes,
    /// Global entry limit across all backends.
    GlobalEntries,
}

impl std::fmt::Display for OverflowScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverflowScope::BackendEntries => f.write_str("backend entry limit"),
            OverflowScope::BackendBytes => f.write_str("backend byte limit"),
            OverflowScope::GlobalEntries => f.write_str("global entry limit"),
        }
    }
}

/// Errors produced while relaying a write.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    #[error("no route for database '{database}' (tenant: {tenant:?}, measurement: {measurement:?})")]
    NoRoute {
        database: String,
        tenant: Option<String>,
        measurement: Option<String>,
    },

    #[error("backend '{backend}' rejected write: {reason}")]
    Rejected { backend: String, reason: String },

    #[error("backend '{backend}' unavailable: {reason}")]
    Unavailable { backend: String, reason: String },

    #[error("group '{group}' accepted by {accepted} member(s), {required} required")]
    ConsistencyNotMet {
        group: String,
        required: usize,
        accepted: usize,
    },

    #[error("retry buffer full for backend '{backend}' ({scope}), write dropped")]
    BufferOverflow {
        backend: String,
        scope: OverflowScope,
    },

    #[error("write for backend '{backend}' dropped after {attempts} replay attempts")]
    RetryExhausted { backend: String, attempts: u32 },

    #[error("write for backend '{backend}' dropped after {age:?} in retry buffer")]
    RetentionExpired { backend: String, age: Duration },
}

impl RelayError {
    /// Label used for the drop-reason metric, `None` when the error is not a data loss.
    pub fn drop_reason(&self) -> Option<&'static str> {
        match self {
            RelayError::BufferOverflow { .. } => Some("overflow"),
            RelayError::RetryExhausted { .. } => Some("exhausted"),
            RelayError::RetentionExpired { .. } => Some("expired"),
            _ => None,
        }
    }
}
