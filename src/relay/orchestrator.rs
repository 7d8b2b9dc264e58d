//! Relay orchestrator.
//!
//! # Responsibilities
//! - Construct tracker, buffer, dispatcher and topology from one configuration
//! - Route and dispatch client writes, aggregating group outcomes
//! - Own the background probe and drain tasks
//! - Apply reloads atomically, persist the retry buffer on stop

use arc_swap::ArcSwap;
use futures_util::future::join_all;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::backend::{ClientFactory, HttpClientFactory, Topology};
use crate::buffer::{DrainScheduler, RetryBuffer};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, RelayConfig};
use crate::dispatch::{Dispatcher, RelayStatus};
use crate::health::{HealthMonitor, HealthTracker};
use crate::lifecycle::Shutdown;
use crate::observability::{metrics, RelayStats};
use crate::relay::status::{BackendStatus, RelayResponse, RelayStatusReport};
use crate::write::WriteRequest;

/// Entry point of the write path.
pub struct Relay {
    config: ArcSwap<RelayConfig>,
    topology: Arc<ArcSwap<Topology>>,
    tracker: Arc<HealthTracker>,
    buffer: Arc<RetryBuffer>,
    dispatcher: Dispatcher,
    stats: Arc<RelayStats>,
    factory: Arc<dyn ClientFactory>,
    shutdown: Shutdown,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Relay {
    /// Build a relay that talks HTTP to its backends.
    pub fn new(config: RelayConfig) -> Result<Self, ConfigError> {
        Self::with_factory(config, Arc::new(HttpClientFactory::new()))
    }

    /// Build a relay with a custom client factory.
    ///
    /// Persisted retry queues are restored here, before any write is accepted.
    pub fn with_factory(config: RelayConfig, factory: Arc<dyn ClientFactory>) -> Result<Self, ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let stats = Arc::new(RelayStats::new());
        let tracker = Arc::new(HealthTracker::new(&config.health));
        let buffer = Arc::new(RetryBuffer::new(config.retry_buffer.clone(), stats.clone()));

        if let Some(dir) = &config.retry_buffer.spool_dir {
            buffer.restore(dir)?;
        }

        let topology = Topology::build(&config, &tracker, factory.as_ref())?;
        let dispatcher = Dispatcher::new(tracker.clone(), buffer.clone(), config.timeouts.clone());

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            topology: Arc::new(ArcSwap::from_pointee(topology)),
            tracker,
            buffer,
            dispatcher,
            stats,
            factory,
            shutdown: Shutdown::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    fn tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the health monitor and the drain scheduler.
    pub fn start(&self) {
        let mut tasks = self.tasks();
        if !tasks.is_empty() {
            tracing::warn!("Relay already started");
            return;
        }

        let config = self.config.load_full();

        // Built first so it is subscribed before the first probe can run.
        let scheduler = DrainScheduler::new(
            self.topology.clone(),
            &self.tracker,
            self.buffer.clone(),
            self.dispatcher.clone(),
            Duration::from_secs(config.retry_buffer.drain_interval_secs),
            !config.health.probe_enabled,
        );
        tasks.push(tokio::spawn(scheduler.run(self.shutdown.subscribe())));

        let monitor = HealthMonitor::new(
            self.topology.clone(),
            self.tracker.clone(),
            config.health.clone(),
            config.timeouts.probe(),
        );
        tasks.push(tokio::spawn(monitor.run(self.shutdown.subscribe())));

        tracing::info!(
            backends = config.backends.len(),
            groups = config.groups.len(),
            rules = config.rules.len(),
            "Relay started"
        );
    }

    /// Route a write and dispatch it to every resolved group.
    pub async fn write(&self, request: WriteRequest) -> RelayResponse {
        let write = Arc::new(request);
        let topology = self.topology.load_full();

        let resolved = match topology.router().resolve(&write.destination) {
            Ok(resolved) => resolved,
            Err(error) => {
                tracing::warn!(write_id = %write.id, error = %error, "Write has no route");
                self.stats.record_no_route();
                metrics::record_write(RelayStatus::NoRoute.label());
                return RelayResponse {
                    write_id: write.id,
                    status: RelayStatus::NoRoute,
                    groups: Vec::new(),
                    error: Some(error),
                };
            }
        };

        // Groups are independent; one group's failure never affects another.
        let groups = join_all(
            resolved
                .iter()
                .map(|group| self.dispatcher.dispatch(group, write.clone())),
        )
        .await;

        let status = RelayStatus::from_groups(&groups);
        match status {
            RelayStatus::Accepted => self.stats.record_accepted(),
            RelayStatus::PartiallyAccepted => self.stats.record_partially_accepted(),
            RelayStatus::Rejected => self.stats.record_rejected(),
            RelayStatus::Unavailable => self.stats.record_unavailable(),
            RelayStatus::NoRoute => self.stats.record_no_route(),
        }
        metrics::record_write(status.label());

        let error = match status {
            RelayStatus::Accepted => None,
            _ => groups.iter().find_map(|g| g.error.clone()),
        };
        if !status.is_success() {
            tracing::warn!(write_id = %write.id, status = ?status, "Write not accepted");
        }

        RelayResponse {
            write_id: write.id,
            status,
            groups,
            error,
        }
    }

    /// Apply a new configuration.
    ///
    /// The topology is swapped whole; in-flight writes finish on the snapshot
    /// they started with. Health state and retry queues are kept by backend name.
    pub fn reload(&self, config: RelayConfig) -> Result<(), ConfigError> {
        validate_config(&config).map_err(ConfigError::Validation)?;
        let topology = Topology::build(&config, &self.tracker, self.factory.as_ref())?;

        self.topology.store(Arc::new(topology));
        self.tracker.set_thresholds(&config.health);
        self.dispatcher.set_timeouts(config.timeouts.clone());
        self.buffer.set_config(config.retry_buffer.clone());
        self.config.store(Arc::new(config));

        tracing::info!("Configuration reloaded");
        Ok(())
    }

    /// Stop background tasks and persist the retry buffer.
    ///
    /// Drainers finish the entry they are replaying before exiting. Member
    /// sends still running past their client's deadline are awaited, so a
    /// late failure is queued before the buffer is written out.
    pub async fn stop(&self) -> io::Result<()> {
        tracing::info!("Relay stopping");
        self.shutdown.trigger();

        let handles = std::mem::take(&mut *self.tasks());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background task failed");
            }
        }
        self.dispatcher.settle_in_flight().await;

        let config = self.config.load_full();
        if let Some(dir) = &config.retry_buffer.spool_dir {
            self.buffer.persist(dir)?;
        } else if self.buffer.total() > 0 {
            tracing::warn!(
                entries = self.buffer.total(),
                "No spool directory configured, buffered writes are lost on exit"
            );
        }
        tracing::info!("Relay stopped");
        Ok(())
    }

    /// Per-backend health and buffer depth plus the relay counters.
    pub fn status(&self) -> RelayStatusReport {
        let topology = self.topology.load_full();
        let backends = topology
            .backends()
            .iter()
            .map(|backend| {
                BackendStatus::new(
                    backend,
                    self.buffer.depth(&backend.name),
                    self.buffer.bytes(&backend.name),
                )
            })
            .collect();

        RelayStatusReport {
            backends,
            buffered_total: self.buffer.total(),
            stats: self.stats.snapshot(),
        }
    }

    pub fn config(&self) -> Arc<RelayConfig> {
        self.config.load_full()
    }

    pub fn topology(&self) -> Arc<Topology> {
        self.topology.load_full()
    }

    pub fn tracker(&self) -> &Arc<HealthTracker> {
        &self.tracker
    }

    pub fn buffer(&self) -> &Arc<RetryBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }
}
