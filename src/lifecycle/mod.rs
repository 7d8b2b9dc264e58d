//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → main stops the listener → Relay::stop
//!
//! Shutdown (shutdown.rs):
//!     Relay::stop → Shutdown::trigger
//!     → probes exit, drainers finish their current entry and exit
//!     → retry queues persisted
//! ```
//!
//! # Design Decisions
//! - Cancellation is cooperative; in-flight sends are never cut mid-request
//! - Signal state is level-triggered (late subscribers still see it)

pub mod shutdown;
pub mod signals;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::shutdown_signal;
