//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single storage node (identity + client)
//! - Expose the node's health as maintained by the health tracker

use std::sync::Arc;

use crate::backend::client::BackendClient;
use crate::health::state::{HealthCell, HealthSnapshot, HealthState};

/// A single storage backend.
#[derive(Debug)]
pub struct Backend {
    /// Unique backend name.
    pub name: String,
    /// Base address as configured.
    pub address: String,
    client: Arc<dyn BackendClient>,
    /// Shared with the health tracker, which is the only writer.
    health: Arc<HealthCell>,
}

impl Backend {
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        client: Arc<dyn BackendClient>,
        health: Arc<HealthCell>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            client,
            health,
        }
    }

    pub fn client(&self) -> Arc<dyn BackendClient> {
        self.client.clone()
    }

    pub fn health_state(&self) -> HealthState {
        self.health.state()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub fn is_down(&self) -> bool {
        self.health_state() == HealthState::Down
    }
}
