//! Health tracking subsystem.
//!
//! # Data Flow
//! ```text
//! Live sends and replays (dispatcher, drainers):
//!     Outcome observed
//!     → tracker.rs record()
//!     → state.rs transition on threshold
//!
//! Active probes (active.rs):
//!     Periodic timer
//!     → Probe each backend
//!     → tracker.rs record_probe()
//!
//! Transitions:
//!     tracker.rs → broadcast → drain scheduler (drain on recovery)
//!                → metrics gauge, logs
//! ```
//!
//! # Design Decisions
//! - Probes run even without traffic so recovery is noticed during an outage
//! - Health state is per-backend, keyed by name, independent of groups
//! - Any accepted outcome recovers immediately; failures need a run

pub mod active;
pub mod state;
pub mod tracker;

pub use active::HealthMonitor;
pub use state::{HealthSnapshot, HealthState};
pub use tracker::{HealthTracker, HealthTransition};
