//! Backend topology: the immutable snapshot built from one configuration.
//!
//! # Responsibilities
//! - Build backends (with clients) and groups from configuration
//! - Compile the router against those groups
//! - Provide lookups by name for the dispatcher, drainers and probes

use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::client::ClientFactory;
use crate::backend::group::BackendGroup;
use crate::backend::node::Backend;
use crate::config::{ConfigError, RelayConfig};
use crate::health::HealthTracker;
use crate::routing::Router;

/// Everything derived from one configuration epoch.
///
/// Never mutated; a reload builds a new `Topology` and swaps it in whole.
#[derive(Debug)]
pub struct Topology {
    /// Backends in declaration order.
    backends: Vec<Arc<Backend>>,
    by_name: HashMap<String, Arc<Backend>>,
    groups: HashMap<String, Arc<BackendGroup>>,
    router: Router,
}

impl Topology {
    /// Build a topology from a validated configuration.
    ///
    /// Health cells come from the tracker so that state survives reloads.
    pub fn build(
        config: &RelayConfig,
        tracker: &HealthTracker,
        factory: &dyn ClientFactory,
    ) -> Result<Self, ConfigError> {
        let mut backends = Vec::with_capacity(config.backends.len());
        let mut by_name = HashMap::new();
        for backend_config in &config.backends {
            let client = factory.build(backend_config)?;
            let backend = Arc::new(Backend::new(
                backend_config.name.clone(),
                backend_config.address.clone(),
                client,
                tracker.register(&backend_config.name),
            ));
            by_name.insert(backend.name.clone(), backend.clone());
            backends.push(backend);
        }

        let mut groups = HashMap::new();
        for group_config in &config.groups {
            let members = group_config
                .members
                .iter()
                .filter_map(|m| by_name.get(m).cloned())
                .collect();
            let group = BackendGroup::new(
                group_config.name.clone(),
                members,
                group_config.consistency,
                group_config.max_in_flight,
            );
            groups.insert(group.name.clone(), Arc::new(group));
        }

        let router = Router::from_config(&config.rules, &groups);

        tracing::info!(
            backends = backends.len(),
            groups = groups.len(),
            rules = router.len(),
            "Topology built"
        );

        Ok(Self {
            backends,
            by_name,
            groups,
            router,
        })
    }

    pub fn backend(&self, name: &str) -> Option<&Arc<Backend>> {
        self.by_name.get(name)
    }

    /// All backends, in declaration order.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn group(&self, name: &str) -> Option<&Arc<BackendGroup>> {
        self.groups.get(name)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }
}
