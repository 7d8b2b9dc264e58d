//! Group dispatch.
//!
//! # Responsibilities
//! - Fan one write out to every member of a group, concurrently
//! - Bound concurrent member sends per group
//! - Return as soon as the group's consistency is decided, or at the deadline
//! - Hand unavailable members to the retry buffer
//! - Feed every outcome to the health tracker
//!
//! # Design Decisions
//! - A member that is down, or that already has queued writes, is not sent
//!   to live; the write joins its queue so per-backend order is kept
//! - Sends outlive the client deadline; late failures are still queued

use arc_swap::ArcSwap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time;

use crate::backend::{Backend, Consistency};
use crate::buffer::RetryBuffer;
use crate::config::TimeoutConfig;
use crate::dispatch::outcome::{GroupOutcome, MemberDisposition, MemberResult};
use crate::health::HealthTracker;
use crate::observability::metrics;
use crate::routing::ResolvedGroup;
use crate::write::{Outcome, WriteRequest};

/// True once no further member result can change the group's verdict.
fn settled(consistency: Consistency, required: usize, accepted: usize, outstanding: usize) -> bool {
    if outstanding == 0 {
        return true;
    }
    match consistency {
        // Every member's disposition is reported for `all` groups.
        Consistency::All => false,
        _ => accepted >= required || accepted + outstanding < required,
    }
}

/// Sends writes to groups and replays buffered writes.
#[derive(Clone)]
pub struct Dispatcher {
    tracker: Arc<HealthTracker>,
    buffer: Arc<RetryBuffer>,
    timeouts: Arc<ArcSwap<TimeoutConfig>>,
    /// Member sends still running, including those past the client deadline.
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl Dispatcher {
    pub fn new(
        tracker: Arc<HealthTracker>,
        buffer: Arc<RetryBuffer>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            tracker,
            buffer,
            timeouts: Arc::new(ArcSwap::from_pointee(timeouts)),
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Apply new timeouts after a reload.
    pub fn set_timeouts(&self, timeouts: TimeoutConfig) {
        self.timeouts.store(Arc::new(timeouts));
    }

    /// Deliver `write` to every member of `resolved`'s group.
    pub async fn dispatch(&self, resolved: &ResolvedGroup, write: Arc<WriteRequest>) -> GroupOutcome {
        let start = Instant::now();
        let group = &resolved.group;
        let timeouts = self.timeouts.load_full();
        let deadline = time::Instant::now() + timeouts.write_deadline();
        let send_timeout = timeouts.send();

        let mut dispositions: Vec<Option<MemberDisposition>> = vec![None; group.members.len()];
        let (tx, mut rx) = mpsc::channel(group.members.len().max(1));
        let mut outstanding = 0;
        let mut accepted = 0;

        for (index, backend) in group.members.iter().enumerate() {
            if backend.is_down() {
                dispositions[index] = Some(self.queue(&backend.name, write.clone(), "backend down"));
                continue;
            }
            if self.buffer.has_pending(&backend.name) {
                dispositions[index] =
                    Some(self.queue(&backend.name, write.clone(), "queued behind buffered writes"));
                continue;
            }

            outstanding += 1;
            let dispatcher = self.clone();
            let backend = backend.clone();
            let write = write.clone();
            let limiter = group.limiter();
            let tx = tx.clone();
            self.track(async move {
                let disposition = dispatcher
                    .send_member(&backend, write, limiter, deadline, send_timeout)
                    .await;
                // The aggregator may have returned already; the outcome has
                // been recorded either way.
                let _ = tx.send((index, disposition)).await;
            });
        }
        drop(tx);

        while !settled(group.consistency, resolved.required, accepted, outstanding) {
            match time::timeout_at(deadline, rx.recv()).await {
                Ok(Some((index, disposition))) => {
                    outstanding -= 1;
                    if matches!(disposition, MemberDisposition::Accepted) {
                        accepted += 1;
                    }
                    dispositions[index] = Some(disposition);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        group = %group.name,
                        write_id = %write.id,
                        outstanding = outstanding,
                        "Write deadline reached with sends in flight"
                    );
                    break;
                }
            }
        }

        let members = group
            .members
            .iter()
            .zip(dispositions)
            .map(|(backend, disposition)| MemberResult {
                backend: backend.name.clone(),
                disposition: disposition.unwrap_or(MemberDisposition::Pending),
            })
            .collect();

        let outcome = GroupOutcome::evaluate(
            group.name.clone(),
            group.consistency,
            resolved.required,
            members,
        );
        metrics::record_dispatch(&group.name, start);
        tracing::debug!(
            group = %outcome.group,
            write_id = %write.id,
            status = ?outcome.status,
            accepted = outcome.accepted,
            required = outcome.required,
            "Group dispatch finished"
        );
        outcome
    }

    async fn send_member(
        &self,
        backend: &Backend,
        write: Arc<WriteRequest>,
        limiter: Arc<Semaphore>,
        deadline: time::Instant,
        send_timeout: Duration,
    ) -> MemberDisposition {
        let permit = match time::timeout_at(deadline, limiter.acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            _ => return self.queue(&backend.name, write, "group send limit reached"),
        };

        let outcome = backend.client().send(&write, send_timeout).await;
        drop(permit);
        self.observe(backend, &outcome);

        match outcome {
            Outcome::Accepted => MemberDisposition::Accepted,
            Outcome::Rejected(reason) => {
                tracing::warn!(
                    backend = %backend.name,
                    write_id = %write.id,
                    reason = %reason,
                    "Backend rejected write"
                );
                MemberDisposition::Rejected(reason)
            }
            Outcome::Unavailable(reason) => self.queue(&backend.name, write, reason),
        }
    }

    fn track<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        // Reap finished sends so the set only holds live ones.
        while in_flight.try_join_next().is_some() {}
        in_flight.spawn(task);
    }

    /// Member sends that have not finished yet.
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        while in_flight.try_join_next().is_some() {}
        in_flight.len()
    }

    /// Wait for every outstanding member send to finish, so late failures
    /// reach the retry buffer before it is persisted.
    ///
    /// Bounded by one write deadline plus one send timeout, the longest a
    /// member send can run. Returns the number of sends abandoned.
    pub async fn settle_in_flight(&self) -> usize {
        let mut pending = std::mem::take(
            &mut *self.in_flight.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if pending.is_empty() {
            return 0;
        }

        let timeouts = self.timeouts.load_full();
        let deadline = time::Instant::now() + timeouts.write_deadline() + timeouts.send();
        tracing::info!(sends = pending.len(), "Waiting for in-flight member sends");

        loop {
            let next = time::timeout_at(deadline, pending.join_next()).await;
            match next {
                Ok(Some(Err(e))) => tracing::error!(error = %e, "Member send task failed"),
                Ok(Some(Ok(()))) => {}
                Ok(None) => return 0,
                Err(_) => {
                    let abandoned = pending.len();
                    tracing::error!(sends = abandoned, "In-flight member sends did not finish before shutdown");
                    pending.shutdown().await;
                    return abandoned;
                }
            }
        }
    }

    /// Send one buffered write to `backend`. Never enqueues.
    pub async fn replay(&self, backend: &Backend, write: &WriteRequest) -> Outcome {
        let send_timeout = self.timeouts.load().send();
        let outcome = backend.client().send(write, send_timeout).await;
        self.observe(backend, &outcome);
        outcome
    }

    fn observe(&self, backend: &Backend, outcome: &Outcome) {
        self.tracker.record(&backend.name, outcome);
        metrics::record_backend_outcome(&backend.name, outcome.label());
    }

    fn queue(&self, backend: &str, write: Arc<WriteRequest>, reason: impl Into<String>) -> MemberDisposition {
        let reason = reason.into();
        let write_id = write.id;
        match self.buffer.enqueue(backend, write) {
            Ok(()) => {
                tracing::debug!(backend = %backend, write_id = %write_id, reason = %reason, "Write queued");
                MemberDisposition::Queued(reason)
            }
            // Already reported through the stats drop path.
            Err(e) => MemberDisposition::Dropped(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendClient, BackendGroup};
    use crate::config::{HealthConfig, RetryBufferConfig};
    use crate::dispatch::GroupStatus;
    use crate::observability::RelayStats;
    use crate::write::Destination;
    use futures_util::future::BoxFuture;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FixedClient {
        outcome: Outcome,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(outcome: Outcome, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl BackendClient for FixedClient {
        fn send<'a>(&'a self, _write: &'a WriteRequest, _timeout: Duration) -> BoxFuture<'a, Outcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.outcome.clone()
            })
        }

        fn probe(&self, _timeout: Duration) -> BoxFuture<'_, Outcome> {
            Box::pin(async { Outcome::Accepted })
        }
    }

    struct Harness {
        tracker: Arc<HealthTracker>,
        buffer: Arc<RetryBuffer>,
        dispatcher: Dispatcher,
    }

    fn harness(write_deadline_ms: u64) -> Harness {
        let stats = Arc::new(RelayStats::new());
        let tracker = Arc::new(HealthTracker::new(&HealthConfig {
            degraded_after: 1,
            down_after: 1,
            ..HealthConfig::default()
        }));
        let buffer = Arc::new(RetryBuffer::new(RetryBufferConfig::default(), stats.clone()));
        let dispatcher = Dispatcher::new(
            tracker.clone(),
            buffer.clone(),
            TimeoutConfig {
                write_deadline_ms,
                ..TimeoutConfig::default()
            },
        );
        Harness {
            tracker,
            buffer,
            dispatcher,
        }
    }

    fn backend(h: &Harness, name: &str, client: Arc<FixedClient>) -> Arc<Backend> {
        Arc::new(Backend::new(name, "http://test", client, h.tracker.register(name)))
    }

    fn resolved(members: Vec<Arc<Backend>>, consistency: Consistency) -> ResolvedGroup {
        let group = Arc::new(BackendGroup::new("g", members, consistency, 16));
        ResolvedGroup {
            rule: "r".into(),
            required: group.required_acks(),
            group,
        }
    }

    fn write() -> Arc<WriteRequest> {
        Arc::new(WriteRequest::new(Destination::new("db"), "cpu v=1"))
    }

    #[test]
    fn test_settled() {
        assert!(settled(Consistency::All, 3, 0, 0));
        assert!(!settled(Consistency::All, 3, 2, 1));
        assert!(settled(Consistency::Quorum(2), 2, 2, 1));
        assert!(!settled(Consistency::Quorum(2), 2, 1, 1));
        // Two failures out of three: quorum-2 can no longer be met.
        assert!(settled(Consistency::Quorum(2), 2, 0, 1));
        assert!(settled(Consistency::Any, 1, 1, 4));
    }

    #[tokio::test]
    async fn test_quorum_returns_without_slow_member() {
        let h = harness(5_000);
        let slow = FixedClient::new(Outcome::Unavailable("timeout".into()), Duration::from_millis(300));
        let members = vec![
            backend(&h, "a", FixedClient::new(Outcome::Accepted, Duration::ZERO)),
            backend(&h, "b", FixedClient::new(Outcome::Accepted, Duration::ZERO)),
            backend(&h, "c", slow.clone()),
        ];
        let group = resolved(members, Consistency::Quorum(2));

        let started = Instant::now();
        let outcome = h.dispatcher.dispatch(&group, write()).await;
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(outcome.status, GroupStatus::Success);
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.member("c"), Some(&MemberDisposition::Pending));

        // The slow member still fails in the background and is queued.
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.buffer.depth("c"), 1);
        assert_eq!(h.buffer.depth("a"), 0);
    }

    #[tokio::test]
    async fn test_settle_waits_for_late_member_failure() {
        let h = harness(5_000);
        let slow = FixedClient::new(Outcome::Unavailable("timeout".into()), Duration::from_millis(300));
        let members = vec![
            backend(&h, "a", FixedClient::new(Outcome::Accepted, Duration::ZERO)),
            backend(&h, "b", FixedClient::new(Outcome::Accepted, Duration::ZERO)),
            backend(&h, "c", slow),
        ];
        let outcome = h.dispatcher.dispatch(&resolved(members, Consistency::Quorum(2)), write()).await;
        assert_eq!(outcome.status, GroupStatus::Success);
        assert!(h.dispatcher.in_flight() >= 1);
        assert_eq!(h.buffer.depth("c"), 0);

        assert_eq!(h.dispatcher.settle_in_flight().await, 0);
        assert_eq!(h.dispatcher.in_flight(), 0);
        assert_eq!(h.buffer.depth("c"), 1);
    }

    #[tokio::test]
    async fn test_all_group_with_down_member_queues_once() {
        let h = harness(5_000);
        let down = FixedClient::new(Outcome::Accepted, Duration::ZERO);
        h.tracker.record("b", &Outcome::Unavailable("refused".into()));
        h.tracker.record("b", &Outcome::Unavailable("refused".into()));

        let members = vec![
            backend(&h, "a", FixedClient::new(Outcome::Accepted, Duration::ZERO)),
            backend(&h, "b", down.clone()),
        ];
        let outcome = h.dispatcher.dispatch(&resolved(members, Consistency::All), write()).await;

        assert_eq!(outcome.status, GroupStatus::Partial);
        assert_eq!(outcome.member("a"), Some(&MemberDisposition::Accepted));
        assert_eq!(
            outcome.member("b"),
            Some(&MemberDisposition::Queued("backend down".into()))
        );
        assert_eq!(down.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.buffer.depth("b"), 1);
    }

    #[tokio::test]
    async fn test_pending_queue_forces_enqueue() {
        let h = harness(5_000);
        let client = FixedClient::new(Outcome::Accepted, Duration::ZERO);
        h.buffer.enqueue("a", write()).unwrap();

        let members = vec![backend(&h, "a", client.clone())];
        let outcome = h.dispatcher.dispatch(&resolved(members, Consistency::Any), write()).await;

        assert_eq!(outcome.status, GroupStatus::Failed);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.buffer.depth("a"), 2);
    }

    #[tokio::test]
    async fn test_deadline_leaves_member_pending() {
        let h = harness(100);
        let members = vec![backend(
            &h,
            "a",
            FixedClient::new(Outcome::Accepted, Duration::from_millis(500)),
        )];
        let outcome = h.dispatcher.dispatch(&resolved(members, Consistency::All), write()).await;

        assert_eq!(outcome.status, GroupStatus::Failed);
        assert_eq!(outcome.member("a"), Some(&MemberDisposition::Pending));
        assert!(matches!(
            outcome.error,
            Some(crate::error::RelayError::ConsistencyNotMet { accepted: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejection_is_not_queued() {
        let h = harness(5_000);
        let members = vec![backend(
            &h,
            "a",
            FixedClient::new(Outcome::Rejected("partial write".into()), Duration::ZERO),
        )];
        let outcome = h.dispatcher.dispatch(&resolved(members, Consistency::All), write()).await;

        assert!(matches!(outcome.member("a"), Some(MemberDisposition::Rejected(_))));
        assert_eq!(h.buffer.depth("a"), 0);
    }
}
