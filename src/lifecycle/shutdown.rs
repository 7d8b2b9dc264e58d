//! Shutdown coordination for the relay.

use tokio::sync::watch;

/// Coordinator for graceful shutdown.
///
/// Long-running tasks hold a [`ShutdownSignal`] and stop cooperatively once
/// it fires. A watch channel is used so tasks subscribing after the trigger
/// still observe it.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<bool>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of [`Shutdown`].
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been triggered (immediately if it already was).
    pub async fn cancelled(&mut self) {
        // An error means the coordinator is gone, which also means shut down.
        let _ = self.rx.wait_for(|triggered| *triggered).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_late_subscriber_sees_trigger() {
        let shutdown = Shutdown::new();
        let early = shutdown.subscribe();
        shutdown.trigger();
        let mut late = shutdown.subscribe();

        assert!(early.is_cancelled());
        assert!(late.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), late.cancelled())
            .await
            .expect("cancelled() should resolve after trigger");
    }

    #[tokio::test]
    async fn test_dropped_coordinator_cancels() {
        let shutdown = Shutdown::new();
        let mut signal = shutdown.subscribe();
        drop(shutdown);
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("dropping the coordinator should release waiters");
    }
}
