//! Health tracker.
//!
//! # Responsibilities
//! - Own one health cell per backend name (survives topology reloads)
//! - Fold live, replay and probe outcomes into state transitions
//! - Publish transitions to subscribers (drain scheduler)

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::HealthConfig;
use crate::health::state::{Change, HealthCell, HealthSnapshot, HealthState, Thresholds};
use crate::observability::metrics;
use crate::write::Outcome;

/// Capacity of the transition channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

/// Observable health change of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthTransition {
    pub backend: String,
    pub from: HealthState,
    pub to: HealthState,
}

/// Tracks health for every backend.
#[derive(Debug)]
pub struct HealthTracker {
    cells: DashMap<String, Arc<HealthCell>>,
    degraded_after: AtomicU32,
    down_after: AtomicU32,
    events: broadcast::Sender<HealthTransition>,
}

impl HealthTracker {
    pub fn new(config: &HealthConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            cells: DashMap::new(),
            degraded_after: AtomicU32::new(config.degraded_after.max(1)),
            down_after: AtomicU32::new(config.down_after.max(1)),
            events,
        }
    }

    /// Apply new thresholds after a reload.
    pub fn set_thresholds(&self, config: &HealthConfig) {
        self.degraded_after
            .store(config.degraded_after.max(1), Ordering::Relaxed);
        self.down_after.store(config.down_after.max(1), Ordering::Relaxed);
    }

    fn thresholds(&self) -> Thresholds {
        Thresholds {
            degraded_after: self.degraded_after.load(Ordering::Relaxed),
            down_after: self.down_after.load(Ordering::Relaxed),
        }
    }

    /// Return the cell for `backend`, creating it if needed.
    pub fn register(&self, backend: &str) -> Arc<HealthCell> {
        self.cells
            .entry(backend.to_string())
            .or_insert_with(|| {
                metrics::record_backend_health(backend, HealthState::Healthy);
                Arc::new(HealthCell::new())
            })
            .clone()
    }

    fn cell(&self, backend: &str) -> Arc<HealthCell> {
        // Clone out of the map so no shard lock is held while mutating.
        if let Some(cell) = self.cells.get(backend).map(|c| c.clone()) {
            return cell;
        }
        self.register(backend)
    }

    /// Subscribe to health transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<HealthTransition> {
        self.events.subscribe()
    }

    /// Record a live or replay outcome.
    ///
    /// Rejections prove the node answered but say nothing about recovery,
    /// so they leave the state untouched.
    pub fn record(&self, backend: &str, outcome: &Outcome) {
        let cell = self.cell(backend);
        let change = match outcome {
            Outcome::Accepted => cell.on_success(),
            Outcome::Unavailable(_) => cell.on_failure(self.thresholds()),
            Outcome::Rejected(_) => None,
        };
        self.publish(backend, change);
    }

    /// Record a liveness probe result.
    pub fn record_probe(&self, backend: &str, outcome: &Outcome) {
        let cell = self.cell(backend);
        let change = match outcome {
            Outcome::Accepted => cell.on_success(),
            _ => cell.on_probe_failure(self.thresholds()),
        };
        self.publish(backend, change);
    }

    fn publish(&self, backend: &str, change: Option<Change>) {
        let Some((from, to)) = change else {
            return;
        };

        match to {
            HealthState::Healthy => {
                tracing::info!(backend = %backend, from = %from, "Backend recovered");
            }
            _ => {
                tracing::warn!(backend = %backend, from = %from, to = %to, "Backend health degraded");
            }
        }
        metrics::record_backend_health(backend, to);

        // No subscribers is fine (e.g. before the relay starts).
        let _ = self.events.send(HealthTransition {
            backend: backend.to_string(),
            from,
            to,
        });
    }

    /// Current state; unknown backends are reported healthy.
    pub fn state(&self, backend: &str) -> HealthState {
        self.cells
            .get(backend)
            .map(|c| c.state())
            .unwrap_or(HealthState::Healthy)
    }

    pub fn snapshot(&self, backend: &str) -> Option<HealthSnapshot> {
        self.cells.get(backend).map(|c| c.snapshot())
    }
}
