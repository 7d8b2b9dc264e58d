//! Metrics collection and exposition.
//!
//! # Metrics
//! - `relay_writes_total` (counter): client writes by relay status
//! - `relay_backend_outcomes_total` (counter): send outcomes by backend
//! - `relay_backend_health` (gauge): 0=healthy, 1=degraded, 2=down
//! - `relay_retry_buffer_depth` (gauge): queued writes per backend
//! - `relay_writes_dropped_total` (counter): data loss by backend, reason
//! - `relay_replayed_total` (counter): buffered writes delivered
//! - `relay_dispatch_duration_seconds` (histogram): group dispatch latency
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, so tests need no setup

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

use crate::health::HealthState;

/// Start the Prometheus scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_write(status: &'static str) {
    counter!("relay_writes_total", "status" => status).increment(1);
}

pub fn record_backend_outcome(backend: &str, outcome: &'static str) {
    counter!(
        "relay_backend_outcomes_total",
        "backend" => backend.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_backend_health(backend: &str, state: HealthState) {
    gauge!("relay_backend_health", "backend" => backend.to_string()).set(state as u8 as f64);
}

pub fn record_buffer_depth(backend: &str, depth: usize) {
    gauge!("relay_retry_buffer_depth", "backend" => backend.to_string()).set(depth as f64);
}

pub fn record_dropped(backend: &str, reason: &'static str) {
    counter!(
        "relay_writes_dropped_total",
        "backend" => backend.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn record_replayed(backend: &str) {
    counter!("relay_replayed_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_dispatch(group: &str, start: Instant) {
    histogram!("relay_dispatch_duration_seconds", "group" => group.to_string())
        .record(start.elapsed().as_secs_f64());
}
