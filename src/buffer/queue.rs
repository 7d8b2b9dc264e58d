//! Per-backend FIFO of retry entries.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant, SystemTime};

use crate::write::WriteRequest;

/// A buffered write waiting for redelivery to one backend.
#[derive(Debug, Clone)]
pub struct RetryEntry {
    /// Buffer-wide sequence number, increasing in enqueue order.
    pub seq: u64,
    pub write: Arc<WriteRequest>,
    /// Replay attempts made so far.
    pub attempts: u32,
    /// Earliest time a scheduled drain may replay this entry.
    pub next_eligible: Instant,
    pub enqueued_at: SystemTime,
}

impl RetryEntry {
    /// Time spent in the buffer; zero if the clock went backwards.
    pub fn age(&self, now: SystemTime) -> Duration {
        now.duration_since(self.enqueued_at).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
pub(crate) struct QueueState {
    pub entries: VecDeque<RetryEntry>,
    pub bytes: usize,
}

/// Queue plus the lock that serializes drainers of one backend.
#[derive(Debug, Default)]
pub(crate) struct BackendQueue {
    state: Mutex<QueueState>,
    /// Held for the whole drain; enqueues never take it.
    pub drain_lock: tokio::sync::Mutex<()>,
}

impl BackendQueue {
    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn front(&self) -> Option<RetryEntry> {
        self.lock().entries.front().cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Remove the head if it is still entry `seq`. Returns the new depth.
    pub fn pop_if(&self, seq: u64) -> Option<(RetryEntry, usize)> {
        let mut state = self.lock();
        if state.entries.front().map(|e| e.seq) != Some(seq) {
            return None;
        }
        let entry = state.entries.pop_front()?;
        state.bytes = state.bytes.saturating_sub(entry.write.size());
        let depth = state.entries.len();
        Some((entry, depth))
    }

    /// Record a failed replay on the head entry.
    pub fn reschedule(&self, seq: u64, attempts: u32, next_eligible: Instant) {
        let mut state = self.lock();
        if let Some(head) = state.entries.front_mut() {
            if head.seq == seq {
                head.attempts = attempts;
                head.next_eligible = next_eligible;
            }
        }
    }
}
