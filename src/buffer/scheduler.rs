//! Drain scheduling.
//!
//! # Responsibilities
//! - Periodically drain every backend with queued writes
//! - Drain immediately when a backend recovers
//! - Sweep expired entries for backends that are down or gone
//! - Without active health checks, replay the head of a down backend's
//!   queue on schedule so it can recover

use arc_swap::ArcSwap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio::time;

use crate::backend::Topology;
use crate::buffer::retry_buffer::{DrainMode, DrainReport, RetryBuffer};
use crate::dispatch::Dispatcher;
use crate::health::{HealthState, HealthTracker, HealthTransition};
use crate::lifecycle::ShutdownSignal;

/// Replays one backend's queue through the dispatcher.
#[derive(Clone)]
struct Drainer {
    topology: Arc<ArcSwap<Topology>>,
    buffer: Arc<RetryBuffer>,
    dispatcher: Dispatcher,
    /// Scheduled drains also try down backends. Set when nothing else
    /// checks their liveness.
    replay_when_down: bool,
}

impl Drainer {
    async fn drain(&self, name: &str, mode: DrainMode, shutdown: &ShutdownSignal) -> DrainReport {
        let topology = self.topology.load_full();
        let backend = match topology.backend(name) {
            Some(backend)
                if mode == DrainMode::Immediate || self.replay_when_down || !backend.is_down() =>
            {
                backend.clone()
            }
            _ => {
                // Down or removed by a reload: nothing to send to, but
                // retention still applies.
                let expired = self.buffer.expire(name).await;
                return DrainReport {
                    expired,
                    remaining: self.buffer.depth(name),
                    ..DrainReport::default()
                };
            }
        };

        self.buffer
            .drain(name, mode, shutdown, |write| {
                let dispatcher = self.dispatcher.clone();
                let backend = backend.clone();
                async move { dispatcher.replay(&backend, &write).await }
            })
            .await
    }
}

/// Background task driving the retry buffer.
pub struct DrainScheduler {
    drainer: Drainer,
    events: broadcast::Receiver<HealthTransition>,
    interval: Duration,
}

impl DrainScheduler {
    /// Subscribes to health transitions immediately, so none are missed
    /// between construction and the first poll of [`run`](Self::run).
    ///
    /// With `replay_when_down`, a scheduled drain sends the head entry of a
    /// down backend's queue and an acceptance marks it healthy again.
    pub fn new(
        topology: Arc<ArcSwap<Topology>>,
        tracker: &HealthTracker,
        buffer: Arc<RetryBuffer>,
        dispatcher: Dispatcher,
        interval: Duration,
        replay_when_down: bool,
    ) -> Self {
        Self {
            drainer: Drainer {
                topology,
                buffer,
                dispatcher,
                replay_when_down,
            },
            events: tracker.subscribe(),
            interval,
        }
    }

    fn spawn_drain(
        &self,
        tasks: &mut JoinSet<DrainReport>,
        backend: String,
        mode: DrainMode,
        shutdown: &ShutdownSignal,
    ) {
        let drainer = self.drainer.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move { drainer.drain(&backend, mode, &shutdown).await });
    }

    fn spawn_cycle(&self, tasks: &mut JoinSet<DrainReport>, shutdown: &ShutdownSignal) {
        for backend in self.drainer.buffer.pending_backends() {
            self.spawn_drain(tasks, backend, DrainMode::Scheduled, shutdown);
        }
    }

    pub async fn run(mut self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval = ?self.interval,
            replay_when_down = self.drainer.replay_when_down,
            "Drain scheduler starting"
        );

        let mut tasks = JoinSet::new();
        // First cycle one interval after start; recoveries drain on their own.
        let period = self.interval.max(Duration::from_millis(10));
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.spawn_cycle(&mut tasks, &shutdown);
                }
                event = self.events.recv() => match event {
                    Ok(transition) if transition.to == HealthState::Healthy => {
                        if self.drainer.buffer.has_pending(&transition.backend) {
                            tracing::info!(backend = %transition.backend, "Backend recovered, draining retry buffer");
                            self.spawn_drain(&mut tasks, transition.backend, DrainMode::Immediate, &shutdown);
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped = skipped, "Drain scheduler lagged behind health events");
                        self.spawn_cycle(&mut tasks, &shutdown);
                    }
                    Err(RecvError::Closed) => break,
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "Drain task failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!("Drain scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        // Drainers stop between entries once shutdown is signalled.
        while tasks.join_next().await.is_some() {}
        tracing::info!("Drain scheduler stopped");
    }
}
