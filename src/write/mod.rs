//! Write path data model.
//!
//! # Data Flow
//! ```text
//! Listener (HTTP body + query)
//!     → request.rs (WriteRequest: destination attributes + opaque payload)
//!     → router / dispatcher / retry buffer
//!     → outcome.rs (per-backend Outcome: accepted | rejected | unavailable)
//! ```
//!
//! # Design Decisions
//! - Payload is opaque `Bytes`; cloning a write never copies the body
//! - Only the first measurement name is read from the payload, for routing

pub mod line_protocol;
pub mod outcome;
pub mod request;

pub use outcome::Outcome;
pub use request::{Destination, Precision, WriteRequest};
