//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::backend::Consistency;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Health tracking and probing.
    pub health: HealthConfig,

    /// Retry buffer bounds and drain schedule.
    pub retry_buffer: RetryBufferConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Operator API.
    pub admin: AdminConfig,

    /// Storage backends.
    pub backends: Vec<BackendConfig>,

    /// Replication groups built from backends.
    pub groups: Vec<GroupConfig>,

    /// Routing rules, in declaration order.
    pub rules: Vec<RuleConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9096").
    pub bind_address: String,

    /// Maximum accepted write body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9096".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Single send attempt to one backend, in milliseconds.
    pub send_ms: u64,

    /// Client-facing deadline for a whole write, in milliseconds.
    pub write_deadline_ms: u64,

    /// Liveness probe timeout, in milliseconds.
    pub probe_ms: u64,
}

impl TimeoutConfig {
    pub fn send(&self) -> Duration {
        Duration::from_millis(self.send_ms)
    }

    pub fn write_deadline(&self) -> Duration {
        Duration::from_millis(self.write_deadline_ms)
    }

    pub fn probe(&self) -> Duration {
        Duration::from_millis(self.probe_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            send_ms: 5_000,
            write_deadline_ms: 10_000,
            probe_ms: 2_000,
        }
    }
}

/// Health tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Enable the background liveness probe. When off, scheduled drains
    /// replay the head of a down backend's queue instead.
    pub probe_enabled: bool,

    /// Probe interval in seconds.
    pub probe_interval_secs: u64,

    /// Consecutive unavailable outcomes before healthy → degraded.
    pub degraded_after: u32,

    /// Further consecutive unavailable outcomes before degraded → down.
    pub down_after: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_enabled: true,
            probe_interval_secs: 10,
            degraded_after: 3,
            down_after: 3,
        }
    }
}

/// Retry buffer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryBufferConfig {
    /// Maximum queued writes per backend.
    pub max_entries_per_backend: usize,

    /// Maximum queued payload bytes per backend (0 = unbounded).
    pub max_bytes_per_backend: usize,

    /// Maximum queued writes across all backends.
    pub max_total_entries: usize,

    /// Replay attempts before a write is dropped.
    pub max_attempts: u32,

    /// Maximum time a write may stay buffered, in seconds.
    pub max_age_secs: u64,

    /// Periodic drain interval in seconds.
    pub drain_interval_secs: u64,

    /// Base delay for replay backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for replay backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Directory where queues are persisted across restarts.
    pub spool_dir: Option<PathBuf>,
}

impl RetryBufferConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for RetryBufferConfig {
    fn default() -> Self {
        Self {
            max_entries_per_backend: 10_000,
            max_bytes_per_backend: 0,
            max_total_entries: 100_000,
            max_attempts: 20,
            max_age_secs: 3_600,
            drain_interval_secs: 5,
            base_delay_ms: 500,
            max_delay_ms: 60_000,
            spool_dir: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Append logs to `tsdb-relay.log` in this directory instead of stdout.
    pub log_dir: Option<PathBuf>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9097".to_string(),
            log_dir: None,
        }
    }
}

/// Operator API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// Storage backend definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    /// Unique backend identifier.
    pub name: String,

    /// Base URL (e.g., "http://10.0.0.5:8086").
    pub address: String,

    /// Path used by the liveness probe.
    #[serde(default = "default_probe_path")]
    pub probe_path: String,
}

fn default_probe_path() -> String {
    "/ping".to_string()
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            probe_path: default_probe_path(),
        }
    }
}

/// Backend group definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    /// Unique group identifier.
    pub name: String,

    /// Member backend names, in order.
    pub members: Vec<String>,

    /// Consistency requirement ("all", "any", "quorum-N").
    #[serde(default)]
    pub consistency: Consistency,

    /// Maximum concurrent member sends for this group.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_max_in_flight() -> usize {
    256
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, members: &[&str], consistency: Consistency) -> Self {
        Self {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            consistency,
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// Routing rule definition.
///
/// Attribute patterns are exact values, `prefix*` globs, or `*`. An absent
/// attribute matches anything.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RuleConfig {
    /// Rule identifier for logging/metrics.
    pub name: String,

    /// Database pattern.
    pub database: Option<String>,

    /// Tenant pattern.
    pub tenant: Option<String>,

    /// Measurement pattern.
    pub measurement: Option<String>,

    /// Groups the matching writes are replicated to.
    pub groups: Vec<String>,
}
