//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → stats.rs (always-on counters for the admin API)
//!
//! Consumers:
//!     → Log aggregation (stdout)
//!     → Metrics endpoint (Prometheus scrape)
//!     → /admin/stats and relay-cli
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Write id flows through dispatch, buffer and replay logs
//! - Every dropped write is logged, counted and exported

pub mod logging;
pub mod metrics;
pub mod stats;

pub use stats::{RelayStats, StatsSnapshot};
