//! Retry buffer subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher (member unavailable, down, or queue non-empty):
//!     → retry_buffer.rs enqueue()
//!     → queue.rs per-backend FIFO (bounded)
//!
//! Draining (scheduler.rs):
//!     Periodic tick          → drain(Scheduled), honours backoff
//!     Backend became healthy → drain(Immediate)
//!     Backend down / removed → expire() only
//!     → dispatcher replay → tracker + stats
//!
//! Shutdown:
//!     Drainers stop between entries → persist() to spool dir
//! Startup:
//!     restore() from spool dir
//! ```
//!
//! # Design Decisions
//! - Queues are keyed by backend name so they survive reloads
//! - Only the head of a queue is ever replayed; a failure stops the pass
//! - Every drop goes through `RelayStats::record_drop`

pub mod backoff;
pub mod queue;
pub mod retry_buffer;
pub mod scheduler;

pub use queue::RetryEntry;
pub use retry_buffer::{DrainMode, DrainReport, RetryBuffer};
pub use scheduler::DrainScheduler;
