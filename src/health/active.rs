//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend, independent of live traffic
//! - Feed probe results into the health tracker

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

use crate::backend::Topology;
use crate::config::HealthConfig;
use crate::health::HealthTracker;
use crate::lifecycle::ShutdownSignal;

pub struct HealthMonitor {
    topology: Arc<ArcSwap<Topology>>,
    tracker: Arc<HealthTracker>,
    config: HealthConfig,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        topology: Arc<ArcSwap<Topology>>,
        tracker: Arc<HealthTracker>,
        config: HealthConfig,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            topology,
            tracker,
            config,
            probe_timeout,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        if !self.config.probe_enabled {
            tracing::info!("Active health checks disabled, down backends recover through scheduled replay");
            return;
        }

        tracing::info!(
            interval = self.config.probe_interval_secs,
            "Health monitor starting"
        );

        let interval = Duration::from_secs(self.config.probe_interval_secs.max(1));
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.check_all().await;
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Probe every backend of the current topology concurrently.
    pub async fn check_all(&self) {
        let topology = self.topology.load_full();

        let probes = topology.backends().iter().map(|backend| {
            let backend = backend.clone();
            let timeout = self.probe_timeout;
            async move {
                let outcome = backend.client().probe(timeout).await;
                if !outcome.is_accepted() {
                    tracing::debug!(backend = %backend.name, outcome = ?outcome, "Health probe failed");
                }
                (backend, outcome)
            }
        });

        for (backend, outcome) in join_all(probes).await {
            self.tracker.record_probe(&backend.name, &outcome);
        }
    }
}
