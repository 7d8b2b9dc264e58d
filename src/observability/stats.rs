//! Relay counters for the operational surface.
//!
//! Metrics exporters are optional; these counters are always kept so the
//! admin API can report accepted, rejected and dropped writes.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::RelayError;
use crate::observability::metrics;

#[derive(Debug, Default)]
pub struct RelayStats {
    accepted: AtomicU64,
    partially_accepted: AtomicU64,
    rejected: AtomicU64,
    unavailable: AtomicU64,
    no_route: AtomicU64,
    queued: AtomicU64,
    replayed: AtomicU64,
    replay_rejected: AtomicU64,
    dropped_overflow: AtomicU64,
    dropped_exhausted: AtomicU64,
    dropped_expired: AtomicU64,
}

/// Point-in-time copy of [`RelayStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub partially_accepted: u64,
    pub rejected: u64,
    pub unavailable: u64,
    pub no_route: u64,
    pub queued: u64,
    pub replayed: u64,
    pub replay_rejected: u64,
    pub dropped_overflow: u64,
    pub dropped_exhausted: u64,
    pub dropped_expired: u64,
}

impl StatsSnapshot {
    pub fn dropped(&self) -> u64 {
        self.dropped_overflow + self.dropped_exhausted + self.dropped_expired
    }
}

impl RelayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partially_accepted(&self) {
        self.partially_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unavailable(&self) {
        self.unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_no_route(&self) {
        self.no_route.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_replayed(&self, backend: &str) {
        self.replayed.fetch_add(1, Ordering::Relaxed);
        metrics::record_replayed(backend);
    }

    pub fn record_replay_rejected(&self) {
        self.replay_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Report a permanently dropped write. This is the only data-loss path.
    pub fn record_drop(&self, backend: &str, write_id: &uuid::Uuid, error: &RelayError) {
        let counter = match error {
            RelayError::BufferOverflow { .. } => &self.dropped_overflow,
            RelayError::RetryExhausted { .. } => &self.dropped_exhausted,
            RelayError::RetentionExpired { .. } => &self.dropped_expired,
            _ => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if let Some(reason) = error.drop_reason() {
            metrics::record_dropped(backend, reason);
        }
        tracing::error!(backend = %backend, write_id = %write_id, error = %error, "Write dropped");
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            partially_accepted: self.partially_accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            unavailable: self.unavailable.load(Ordering::Relaxed),
            no_route: self.no_route.load(Ordering::Relaxed),
            queued: self.queued.load(Ordering::Relaxed),
            replayed: self.replayed.load(Ordering::Relaxed),
            replay_rejected: self.replay_rejected.load(Ordering::Relaxed),
            dropped_overflow: self.dropped_overflow.load(Ordering::Relaxed),
            dropped_exhausted: self.dropped_exhausted.load(Ordering::Relaxed),
            dropped_expired: self.dropped_expired.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OverflowScope;

    #[test]
    fn test_drop_counters() {
        let stats = RelayStats::new();
        let id = uuid::Uuid::new_v4();
        stats.record_drop(
            "a",
            &id,
            &RelayError::BufferOverflow {
                backend: "a".into(),
                scope: OverflowScope::BackendEntries,
            },
        );
        stats.record_drop(
            "a",
            &id,
            &RelayError::RetryExhausted {
                backend: "a".into(),
                attempts: 3,
            },
        );
        // Not a data-loss error: ignored.
        stats.record_drop(
            "a",
            &id,
            &RelayError::Rejected {
                backend: "a".into(),
                reason: "bad".into(),
            },
        );

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.dropped_overflow, 1);
        assert_eq!(snapshot.dropped_exhausted, 1);
        assert_eq!(snapshot.dropped(), 2);
    }
}
