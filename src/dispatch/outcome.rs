//! Dispatch results: per member, per group and per write.

use serde::{Serialize, Serializer};

use crate::backend::Consistency;
use crate::error::RelayError;

/// What happened to a write for one group member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "disposition", content = "reason", rename_all = "snake_case")]
pub enum MemberDisposition {
    /// Stored by the backend.
    Accepted,
    /// Refused by the backend; not retried.
    Rejected(String),
    /// Placed in the retry buffer.
    Queued(String),
    /// Could not be queued (buffer full); the write is lost for this member.
    Dropped(String),
    /// Still in flight when the write deadline passed. The send continues
    /// in the background and is queued if it fails.
    Pending,
}

impl MemberDisposition {
    pub fn is_accepted(&self) -> bool {
        matches!(self, MemberDisposition::Accepted)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MemberDisposition::Rejected(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberResult {
    pub backend: String,
    #[serde(flatten)]
    pub disposition: MemberDisposition,
}

/// Whether a group met its consistency requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Requirement met.
    Success,
    /// `all` group with some but not every member accepting.
    Partial,
    /// Requirement not met.
    Failed,
}

/// Result of dispatching one write to one group.
#[derive(Debug, Clone, Serialize)]
pub struct GroupOutcome {
    pub group: String,
    pub consistency: Consistency,
    pub required: usize,
    pub accepted: usize,
    pub status: GroupStatus,
    pub members: Vec<MemberResult>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<RelayError>,
}

impl GroupOutcome {
    /// Aggregate member results against the group's requirement.
    pub fn evaluate(
        group: impl Into<String>,
        consistency: Consistency,
        required: usize,
        members: Vec<MemberResult>,
    ) -> Self {
        let group = group.into();
        let accepted = members.iter().filter(|m| m.disposition.is_accepted()).count();
        let rejected = members.iter().filter(|m| m.disposition.is_rejected()).count();

        let status = match consistency {
            Consistency::All if accepted == members.len() => GroupStatus::Success,
            Consistency::All if accepted > 0 => GroupStatus::Partial,
            Consistency::All => GroupStatus::Failed,
            _ if accepted >= required => GroupStatus::Success,
            _ => GroupStatus::Failed,
        };

        let error = match status {
            GroupStatus::Success => None,
            _ if rejected > 0 && accepted == 0 => members.iter().find_map(|m| match &m.disposition {
                MemberDisposition::Rejected(reason) => Some(RelayError::Rejected {
                    backend: m.backend.clone(),
                    reason: reason.clone(),
                }),
                _ => None,
            }),
            _ => Some(RelayError::ConsistencyNotMet {
                group: group.clone(),
                required,
                accepted,
            }),
        };

        Self {
            group,
            consistency,
            required,
            accepted,
            status,
            members,
            error,
        }
    }

    pub fn member(&self, backend: &str) -> Option<&MemberDisposition> {
        self.members
            .iter()
            .find(|m| m.backend == backend)
            .map(|m| &m.disposition)
    }
}

fn serialize_error<S: Serializer>(error: &Option<RelayError>, serializer: S) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Overall result of a client write across every routed group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayStatus {
    /// Every group succeeded.
    Accepted,
    /// At least one group stored the write, but not all succeeded.
    PartiallyAccepted,
    /// Backends refused the payload.
    Rejected,
    /// No group stored the write.
    Unavailable,
    /// No routing rule matched.
    NoRoute,
}

impl RelayStatus {
    /// Combine group outcomes into the client-facing status.
    pub fn from_groups(groups: &[GroupOutcome]) -> Self {
        if groups.is_empty() {
            return RelayStatus::NoRoute;
        }
        if groups.iter().all(|g| g.status == GroupStatus::Success) {
            return RelayStatus::Accepted;
        }
        if groups.iter().any(|g| g.status != GroupStatus::Failed) {
            return RelayStatus::PartiallyAccepted;
        }
        if groups
            .iter()
            .any(|g| matches!(g.error, Some(RelayError::Rejected { .. })))
        {
            RelayStatus::Rejected
        } else {
            RelayStatus::Unavailable
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            RelayStatus::Accepted => "accepted",
            RelayStatus::PartiallyAccepted => "partially_accepted",
            RelayStatus::Rejected => "rejected",
            RelayStatus::Unavailable => "unavailable",
            RelayStatus::NoRoute => "no_route",
        }
    }

    /// True when at least one group stored the write.
    pub fn is_success(&self) -> bool {
        matches!(self, RelayStatus::Accepted | RelayStatus::PartiallyAccepted)
    }
}
