//! Per-backend send outcome.

use serde::Serialize;

/// Result of a single send attempt against one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    /// The backend stored the write.
    Accepted,
    /// The backend refused the payload. Permanent, never retried.
    Rejected(String),
    /// Transport failure or transient server error. Retried via the buffer.
    Unavailable(String),
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Outcome::Unavailable(_))
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected(_) => "rejected",
            Outcome::Unavailable(_) => "unavailable",
        }
    }
}
