//! Backend health state machine.
//!
//! # States
//! - Healthy: normal operation
//! - Degraded: recent transient failures, still receives live traffic
//! - Down: live sends are skipped, writes go straight to the retry buffer
//!
//! # State Transitions
//! ```text
//! Healthy  → Degraded: consecutive unavailable >= degraded_after
//! Degraded → Down:     consecutive unavailable >= degraded_after + down_after,
//!                      or a failed liveness probe
//! Degraded/Down → Healthy: first accepted outcome (live or probe)
//! ```
//!
//! # Design Decisions
//! - One mutex per backend guards state, counter and timestamp together so
//!   readers never see a torn record; it is never held across an await
//! - Repeated outcomes in a terminal position are no-ops (no re-entry events)

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Health classification of a backend.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy = 0,
    Degraded = 1,
    Down = 2,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Down => "down",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transition thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub degraded_after: u32,
    pub down_after: u32,
}

impl Thresholds {
    fn down_total(&self) -> u32 {
        self.degraded_after.saturating_add(self.down_after)
    }
}

/// Consistent copy of a backend's health record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub last_success: Option<SystemTime>,
}

/// A state change, `from` → `to`.
pub type Change = (HealthState, HealthState);

/// Per-backend health record.
#[derive(Debug)]
pub struct HealthCell {
    record: Mutex<HealthSnapshot>,
}

impl Default for HealthCell {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthCell {
    /// New backends start healthy.
    pub fn new() -> Self {
        Self {
            record: Mutex::new(HealthSnapshot {
                state: HealthState::Healthy,
                consecutive_failures: 0,
                last_success: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HealthSnapshot> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> HealthState {
        self.lock().state
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        self.lock().clone()
    }

    /// Record an accepted outcome.
    pub(crate) fn on_success(&self) -> Option<Change> {
        let mut record = self.lock();
        record.consecutive_failures = 0;
        record.last_success = Some(SystemTime::now());
        let from = record.state;
        if from == HealthState::Healthy {
            return None;
        }
        record.state = HealthState::Healthy;
        Some((from, HealthState::Healthy))
    }

    /// Record an unavailable outcome from live traffic or replay.
    pub(crate) fn on_failure(&self, thresholds: Thresholds) -> Option<Change> {
        let mut record = self.lock();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        let from = record.state;
        let to = match from {
            HealthState::Healthy if record.consecutive_failures >= thresholds.degraded_after => {
                HealthState::Degraded
            }
            HealthState::Degraded if record.consecutive_failures >= thresholds.down_total() => {
                HealthState::Down
            }
            other => other,
        };
        Self::apply(&mut record, from, to)
    }

    /// Record a failed liveness probe. A degraded backend goes down at once.
    pub(crate) fn on_probe_failure(&self, thresholds: Thresholds) -> Option<Change> {
        let mut record = self.lock();
        record.consecutive_failures = record.consecutive_failures.saturating_add(1);
        let from = record.state;
        let to = match from {
            HealthState::Degraded => HealthState::Down,
            HealthState::Healthy if record.consecutive_failures >= thresholds.degraded_after => {
                HealthState::Degraded
            }
            other => other,
        };
        Self::apply(&mut record, from, to)
    }

    fn apply(record: &mut HealthSnapshot, from: HealthState, to: HealthState) -> Option<Change> {
        if from == to {
            None
        } else {
            record.state = to;
            Some((from, to))
        }
    }
}
