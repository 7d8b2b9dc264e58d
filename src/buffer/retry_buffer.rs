//! Retry buffer.
//!
//! # Responsibilities
//! - Queue writes that a backend could not take, per backend, in FIFO order
//! - Enforce per-backend (entries, bytes) and global (entries) bounds
//! - Replay queued writes in order, stopping at the first failure
//! - Drop and report entries past the attempt ceiling or retention age
//! - Persist queues across restarts

use arc_swap::ArcSwap;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::future::Future;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use crate::buffer::backoff::calculate_backoff;
use crate::buffer::queue::{BackendQueue, RetryEntry};
use crate::config::RetryBufferConfig;
use crate::error::{OverflowScope, RelayError};
use crate::lifecycle::ShutdownSignal;
use crate::observability::{metrics, RelayStats};
use crate::write::{Outcome, WriteRequest};

/// Whether a drain honours per-entry backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// Periodic cycle: stop at an entry that is not yet eligible.
    Scheduled,
    /// Triggered by recovery: replay regardless of backoff.
    Immediate,
}

/// What a single drain pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub rejected: usize,
    pub expired: usize,
    pub exhausted: usize,
    /// Stopped at an entry that failed again or is still backing off.
    pub stalled: bool,
    /// Another drainer held the backend.
    pub busy: bool,
    pub cancelled: bool,
    pub remaining: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    write: WriteRequest,
    attempts: u32,
    enqueued_at: SystemTime,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedQueue {
    backend: String,
    entries: Vec<PersistedEntry>,
}

/// Bounded per-backend FIFO of writes pending redelivery.
#[derive(Debug)]
pub struct RetryBuffer {
    queues: DashMap<String, Arc<BackendQueue>>,
    total: AtomicUsize,
    next_seq: AtomicU64,
    config: ArcSwap<RetryBufferConfig>,
    stats: Arc<RelayStats>,
}

impl RetryBuffer {
    pub fn new(config: RetryBufferConfig, stats: Arc<RelayStats>) -> Self {
        Self {
            queues: DashMap::new(),
            total: AtomicUsize::new(0),
            next_seq: AtomicU64::new(0),
            config: ArcSwap::from_pointee(config),
            stats,
        }
    }

    /// Apply new bounds after a reload. Existing entries are kept.
    pub fn set_config(&self, config: RetryBufferConfig) {
        self.config.store(Arc::new(config));
    }

    fn queue(&self, backend: &str) -> Arc<BackendQueue> {
        if let Some(queue) = self.queues.get(backend).map(|q| q.clone()) {
            return queue;
        }
        self.queues.entry(backend.to_string()).or_default().clone()
    }

    fn existing_queue(&self, backend: &str) -> Option<Arc<BackendQueue>> {
        self.queues.get(backend).map(|q| q.clone())
    }

    /// Append a write to `backend`'s queue.
    ///
    /// When a bound is hit the write is dropped, reported, and
    /// `BufferOverflow` is returned.
    pub fn enqueue(&self, backend: &str, write: Arc<WriteRequest>) -> Result<(), RelayError> {
        self.push(backend, write, 0, SystemTime::now())
    }

    fn push(
        &self,
        backend: &str,
        write: Arc<WriteRequest>,
        attempts: u32,
        enqueued_at: SystemTime,
    ) -> Result<(), RelayError> {
        let config = self.config.load();
        let queue = self.queue(backend);
        let size = write.size();

        let depth = {
            let mut state = queue.lock();

            let scope = if state.entries.len() >= config.max_entries_per_backend {
                Some(OverflowScope::BackendEntries)
            } else if config.max_bytes_per_backend > 0
                && state.bytes + size > config.max_bytes_per_backend
            {
                Some(OverflowScope::BackendBytes)
            } else if self
                .total
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |t| {
                    (t < config.max_total_entries).then_some(t + 1)
                })
                .is_err()
            {
                Some(OverflowScope::GlobalEntries)
            } else {
                None
            };

            if let Some(scope) = scope {
                drop(state);
                let error = RelayError::BufferOverflow {
                    backend: backend.to_string(),
                    scope,
                };
                self.stats.record_drop(backend, &write.id, &error);
                return Err(error);
            }

            state.entries.push_back(RetryEntry {
                seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                write,
                attempts,
                next_eligible: Instant::now(),
                enqueued_at,
            });
            state.bytes += size;
            state.entries.len()
        };

        self.stats.record_queued();
        metrics::record_buffer_depth(backend, depth);
        tracing::debug!(backend = %backend, depth = depth, "Write queued for retry");
        Ok(())
    }

    /// True if `backend` has queued writes; new writes must queue behind them.
    pub fn has_pending(&self, backend: &str) -> bool {
        self.existing_queue(backend)
            .map(|q| q.len() > 0)
            .unwrap_or(false)
    }

    pub fn depth(&self, backend: &str) -> usize {
        self.existing_queue(backend).map(|q| q.len()).unwrap_or(0)
    }

    pub fn bytes(&self, backend: &str) -> usize {
        let Some(queue) = self.existing_queue(backend) else {
            return 0;
        };
        let bytes = queue.lock().bytes;
        bytes
    }

    /// Total queued writes across all backends.
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Backends that currently have queued writes.
    pub fn pending_backends(&self) -> Vec<String> {
        self.queues
            .iter()
            .filter(|q| q.value().len() > 0)
            .map(|q| q.key().clone())
            .collect()
    }

    /// Copy of `backend`'s queue, head first.
    pub fn entries(&self, backend: &str) -> Vec<RetryEntry> {
        let Some(queue) = self.existing_queue(backend) else {
            return Vec::new();
        };
        let entries = queue.lock().entries.iter().cloned().collect();
        entries
    }

    fn remove(&self, backend: &str, queue: &BackendQueue, seq: u64) -> Option<RetryEntry> {
        let (entry, depth) = queue.pop_if(seq)?;
        self.total.fetch_sub(1, Ordering::AcqRel);
        metrics::record_buffer_depth(backend, depth);
        Some(entry)
    }

    /// Replay `backend`'s queue in order through `send`.
    ///
    /// Only one drainer runs per backend; a concurrent call returns with
    /// `busy` set. The pass stops at the first entry that is unavailable
    /// again (or not yet eligible in `Scheduled` mode) so later entries never
    /// overtake it. Shutdown is honoured between entries only.
    pub async fn drain<F, Fut>(
        &self,
        backend: &str,
        mode: DrainMode,
        shutdown: &ShutdownSignal,
        mut send: F,
    ) -> DrainReport
    where
        F: FnMut(Arc<WriteRequest>) -> Fut,
        Fut: Future<Output = Outcome>,
    {
        let mut report = DrainReport::default();
        let Some(queue) = self.existing_queue(backend) else {
            return report;
        };
        let Ok(_guard) = queue.drain_lock.try_lock() else {
            report.busy = true;
            report.remaining = queue.len();
            return report;
        };

        loop {
            if shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let Some(entry) = queue.front() else {
                break;
            };
            let config = self.config.load_full();

            if self.expire_entry(backend, &queue, &entry, &config) {
                report.expired += 1;
                continue;
            }

            if mode == DrainMode::Scheduled && entry.next_eligible > Instant::now() {
                report.stalled = true;
                break;
            }

            match send(entry.write.clone()).await {
                Outcome::Accepted => {
                    self.remove(backend, &queue, entry.seq);
                    self.stats.record_replayed(backend);
                    report.replayed += 1;
                }
                Outcome::Rejected(reason) => {
                    self.remove(backend, &queue, entry.seq);
                    self.stats.record_replay_rejected();
                    tracing::warn!(
                        backend = %backend,
                        write_id = %entry.write.id,
                        reason = %reason,
                        "Buffered write rejected on replay"
                    );
                    report.rejected += 1;
                }
                Outcome::Unavailable(reason) => {
                    let attempts = entry.attempts.saturating_add(1);
                    if attempts >= config.max_attempts {
                        self.remove(backend, &queue, entry.seq);
                        let error = RelayError::RetryExhausted {
                            backend: backend.to_string(),
                            attempts,
                        };
                        self.stats.record_drop(backend, &entry.write.id, &error);
                        report.exhausted += 1;
                    } else {
                        let delay =
                            calculate_backoff(attempts, config.base_delay_ms, config.max_delay_ms);
                        queue.reschedule(entry.seq, attempts, Instant::now() + delay);
                        tracing::debug!(
                            backend = %backend,
                            attempts = attempts,
                            delay = ?delay,
                            reason = %reason,
                            "Replay failed, backing off"
                        );
                    }
                    report.stalled = true;
                    break;
                }
            }
        }

        report.remaining = queue.len();
        if report.replayed > 0 || report.expired > 0 || report.exhausted > 0 {
            tracing::info!(
                backend = %backend,
                replayed = report.replayed,
                rejected = report.rejected,
                expired = report.expired,
                exhausted = report.exhausted,
                remaining = report.remaining,
                "Retry buffer drained"
            );
        }
        report
    }

    /// Drop entries past retention age without replaying anything.
    ///
    /// Used for backends that are down so retention holds during long outages.
    pub async fn expire(&self, backend: &str) -> usize {
        let Some(queue) = self.existing_queue(backend) else {
            return 0;
        };
        let Ok(_guard) = queue.drain_lock.try_lock() else {
            return 0;
        };

        let config = self.config.load();
        let mut expired = 0;
        while let Some(entry) = queue.front() {
            if !self.expire_entry(backend, &queue, &entry, &config) {
                break;
            }
            expired += 1;
        }
        expired
    }

    fn expire_entry(
        &self,
        backend: &str,
        queue: &BackendQueue,
        entry: &RetryEntry,
        config: &RetryBufferConfig,
    ) -> bool {
        let age = entry.age(SystemTime::now());
        if age <= config.max_age() {
            return false;
        }
        if self.remove(backend, queue, entry.seq).is_some() {
            let error = RelayError::RetentionExpired {
                backend: backend.to_string(),
                age,
            };
            self.stats.record_drop(backend, &entry.write.id, &error);
        }
        true
    }

    /// Write every non-empty queue to `{dir}/{backend}.json`.
    ///
    /// Call after drainers have stopped. Returns the number of entries written.
    pub fn persist(&self, dir: &Path) -> io::Result<usize> {
        fs::create_dir_all(dir)?;
        let mut written = 0;

        for item in self.queues.iter() {
            let backend = item.key();
            let path = dir.join(spool_file_name(backend));
            let entries: Vec<PersistedEntry> = item
                .value()
                .lock()
                .entries
                .iter()
                .map(|e| PersistedEntry {
                    write: (*e.write).clone(),
                    attempts: e.attempts,
                    enqueued_at: e.enqueued_at,
                })
                .collect();

            if entries.is_empty() {
                if path.exists() {
                    fs::remove_file(&path)?;
                }
                continue;
            }

            let tmp = path.with_extension("json.tmp");
            {
                let mut writer = BufWriter::new(File::create(&tmp)?);
                let persisted = PersistedQueue {
                    backend: backend.clone(),
                    entries,
                };
                serde_json::to_writer(&mut writer, &persisted)?;
                writer.flush()?;
                written += persisted.entries.len();
            }
            fs::rename(&tmp, &path)?;
        }

        tracing::info!(dir = ?dir, entries = written, "Retry buffer persisted");
        Ok(written)
    }

    /// Load queues persisted by [`persist`](Self::persist) and remove the files.
    ///
    /// Entries keep their order, attempt count and enqueue time. Bounds are
    /// enforced; anything that no longer fits is dropped and reported.
    ///
    /// Every file is read before any is consumed. A file that does not parse
    /// is renamed to `*.corrupt` and skipped; the others are still restored.
    /// Files are removed only once their entries are back in memory.
    pub fn restore(&self, dir: &Path) -> io::Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let mut paths = Vec::new();
        for dir_entry in fs::read_dir(dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let reader = BufReader::new(File::open(&path)?);
            match serde_json::from_reader::<_, PersistedQueue>(reader) {
                Ok(persisted) => loaded.push((path, persisted)),
                Err(e) if e.is_io() => return Err(e.into()),
                Err(e) => quarantine(&path, &e)?,
            }
        }

        let (consumed, queues): (Vec<_>, Vec<PersistedQueue>) = loaded.into_iter().unzip();
        let mut restored = 0;
        for persisted in queues {
            for entry in persisted.entries {
                if self
                    .push(
                        &persisted.backend,
                        Arc::new(entry.write),
                        entry.attempts,
                        entry.enqueued_at,
                    )
                    .is_ok()
                {
                    restored += 1;
                }
            }
        }
        for path in &consumed {
            fs::remove_file(path)?;
        }

        if restored > 0 {
            tracing::info!(dir = ?dir, entries = restored, "Retry buffer restored");
        }
        Ok(restored)
    }
}

/// Move an unreadable spool file aside so it is neither lost nor retried.
fn quarantine(path: &Path, error: &serde_json::Error) -> io::Result<()> {
    let mut target = path.as_os_str().to_owned();
    target.push(".corrupt");
    fs::rename(path, &target)?;
    tracing::error!(
        file = ?path,
        moved_to = ?target,
        error = %error,
        "Spool file is corrupt, skipped"
    );
    Ok(())
}

fn spool_file_name(backend: &str) -> String {
    let safe: String = backend
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", safe)
}
