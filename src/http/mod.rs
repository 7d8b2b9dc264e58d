//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, body limit, tracing)
//!     → write.rs (query + headers + body → WriteRequest)
//!     → Relay::write
//!     → write.rs (RelayStatus → status code, JSON error body)
//!     → Send to client
//! ```

pub mod server;
pub mod write;

pub use server::{AppState, HttpServer};
