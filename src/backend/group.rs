//! Backend groups: replication targets sharing a consistency requirement.

use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::backend::consistency::Consistency;
use crate::backend::node::Backend;

/// An ordered set of backends treated as one replication target.
#[derive(Debug)]
pub struct BackendGroup {
    pub name: String,
    pub members: Vec<Arc<Backend>>,
    pub consistency: Consistency,
    /// Bounds concurrent member sends across all writes to this group.
    limiter: Arc<Semaphore>,
}

impl BackendGroup {
    pub fn new(
        name: impl Into<String>,
        members: Vec<Arc<Backend>>,
        consistency: Consistency,
        max_in_flight: usize,
    ) -> Self {
        Self {
            name: name.into(),
            members,
            consistency,
            limiter: Arc::new(Semaphore::new(max_in_flight.max(1))),
        }
    }

    pub fn limiter(&self) -> Arc<Semaphore> {
        self.limiter.clone()
    }

    /// Members whose health is not `down`.
    pub fn live_members(&self) -> usize {
        self.members.iter().filter(|m| !m.is_down()).count()
    }

    /// Acceptances needed right now to satisfy the group's consistency.
    pub fn required_acks(&self) -> usize {
        self.consistency
            .required(self.members.len(), self.live_members())
    }
}
