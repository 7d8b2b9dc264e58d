//! Write requests and their routing attributes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Timestamp precision of the points in a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    #[default]
    Ns,
    Us,
    Ms,
    S,
    M,
    H,
}

impl Precision {
    /// Query-string value understood by the storage backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            Precision::Ns => "ns",
            Precision::Us => "u",
            Precision::Ms => "ms",
            Precision::S => "s",
            Precision::M => "m",
            Precision::H => "h",
        }
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "n" | "ns" => Ok(Precision::Ns),
            "u" | "us" | "µ" => Ok(Precision::Us),
            "ms" => Ok(Precision::Ms),
            "s" => Ok(Precision::S),
            "m" => Ok(Precision::M),
            "h" => Ok(Precision::H),
            other => Err(format!("unknown precision '{}'", other)),
        }
    }
}

/// Routing attributes of a write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Destination {
    /// Target database (resource name).
    pub database: String,
    /// Optional retention policy, forwarded untouched.
    pub retention_policy: Option<String>,
    /// Tenant the write belongs to.
    pub tenant: Option<String>,
    /// First measurement found in the payload.
    pub measurement: Option<String>,
    pub precision: Precision,
}

impl Destination {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_measurement(mut self, measurement: impl Into<String>) -> Self {
        self.measurement = Some(measurement.into());
        self
    }
}

/// A decoded write: routing attributes plus the opaque payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// Unique id used to correlate logs across fan-out and replay.
    pub id: Uuid,
    pub destination: Destination,
    pub payload: Bytes,
    pub received_at: SystemTime,
}

impl WriteRequest {
    pub fn new(destination: Destination, payload: impl Into<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination,
            payload: payload.into(),
            received_at: SystemTime::now(),
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}
