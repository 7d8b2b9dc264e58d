//! Write dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! ResolvedGroup + WriteRequest
//!     → dispatcher.rs dispatch()
//!         member down / queue non-empty → retry buffer
//!         otherwise → spawned send (group limiter, send timeout)
//!             → health tracker, metrics
//!             → unavailable → retry buffer
//!     → aggregate until consistency decided or deadline
//!     → outcome.rs GroupOutcome
//! ```

pub mod dispatcher;
pub mod outcome;

pub use dispatcher::Dispatcher;
pub use outcome::{GroupOutcome, GroupStatus, MemberDisposition, MemberResult, RelayStatus};
