//! Relay orchestration.
//!
//! # Data Flow
//! ```text
//! Listener → Relay::write(WriteRequest)
//!     → Topology snapshot (arc-swap load)
//!     → Router::resolve → [ResolvedGroup]
//!     → Dispatcher::dispatch per group (concurrently)
//!     → RelayStatus::from_groups → RelayResponse
//!
//! Lifecycle:
//!     with_factory → restore spool → build topology
//!     start        → HealthMonitor + DrainScheduler tasks
//!     reload       → validate → build → swap
//!     stop         → shutdown signal → await tasks → persist spool
//! ```

pub mod orchestrator;
pub mod status;

pub use orchestrator::Relay;
pub use status::{BackendStatus, RelayResponse, RelayStatusReport};
