//! Scoring Progress Manager
//!
//! Holds the latest [`ProgressState`] per document in a `watch` channel, so
//! subscribers that arrive late still observe the current value, terminal
//! ones included.
//!
//! **Write rules:**
//! - Each accepted job gets a fresh generation; writes carrying an older
//!   generation than the document's current one are dropped.
//! - Within a generation steps only move forward and a terminal step is final.
//!
//! A background sweep (started with [`ProgressManager::spawn_cleanup_task`])
//! evicts terminal entries after `terminal_ttl` and abandoned in-progress
//! entries after `stale_ttl`.

use bnews_common::time::elapsed_since;
use futures::Stream;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{ProgressState, ProgressStep, ScoreResult};

struct Entry {
    generation: u64,
    tx: watch::Sender<ProgressState>,
}

/// Per-document progress store
pub struct ProgressManager {
    entries: RwLock<HashMap<i64, Entry>>,
    next_generation: AtomicU64,
    cleanup_interval: Duration,
    terminal_ttl: Duration,
    stale_ttl: Duration,
    shutdown: CancellationToken,
}

impl ProgressManager {
    pub fn new(cleanup_interval: Duration, terminal_ttl: Duration, stale_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
            cleanup_interval,
            terminal_ttl,
            stale_ttl,
            shutdown: CancellationToken::new(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<i64, Entry>> {
        self.entries.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<i64, Entry>> {
        self.entries.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Accept a new job for `document_id` and publish its Queued state
    ///
    /// Any job already running for the document is superseded: its later
    /// writes are dropped.
    pub fn begin_job(self: &Arc<Self>, document_id: i64) -> JobProgress {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let job_id = Uuid::new_v4();
        let state = ProgressState::queued(document_id, job_id, generation);

        {
            let mut entries = self.write();
            match entries.get_mut(&document_id) {
                Some(entry) => {
                    if !entry.tx.borrow().is_terminal() {
                        debug!(
                            doc_id = document_id,
                            superseded_generation = entry.generation,
                            generation,
                            "Superseding running job"
                        );
                    }
                    entry.generation = generation;
                    entry.tx.send_replace(state);
                }
                None => {
                    let (tx, _rx) = watch::channel(state);
                    entries.insert(document_id, Entry { generation, tx });
                }
            }
        }

        debug!(doc_id = document_id, %job_id, generation, "Job queued");

        JobProgress {
            manager: Arc::clone(self),
            document_id,
            generation,
            job_id,
        }
    }

    /// Publish `state` for its document
    ///
    /// Returns false when the write was dropped: an older generation than the
    /// current one, a backwards step, or a write after the terminal state.
    pub fn set(&self, state: ProgressState) -> bool {
        let document_id = state.document_id;
        let mut entries = self.write();

        match entries.get_mut(&document_id) {
            None => {
                let generation = state.generation;
                let (tx, _rx) = watch::channel(state);
                entries.insert(document_id, Entry { generation, tx });
                true
            }
            Some(entry) => {
                if state.generation < entry.generation {
                    debug!(
                        doc_id = document_id,
                        generation = state.generation,
                        current_generation = entry.generation,
                        "Dropping progress write from superseded job"
                    );
                    return false;
                }
                if state.generation == entry.generation {
                    let current = entry.tx.borrow().step;
                    if !current.can_advance_to(state.step) {
                        debug!(
                            doc_id = document_id,
                            from = current.label(),
                            to = state.step.label(),
                            "Dropping out-of-order progress write"
                        );
                        return false;
                    }
                }
                entry.generation = state.generation;
                entry.tx.send_replace(state);
                true
            }
        }
    }

    /// Apply `update` to the current state of `generation`, if still current
    fn advance<F>(&self, document_id: i64, generation: u64, update: F) -> bool
    where
        F: FnOnce(&ProgressState) -> ProgressState,
    {
        let entries = self.write();
        let Some(entry) = entries.get(&document_id) else {
            debug!(doc_id = document_id, generation, "Progress entry gone, write dropped");
            return false;
        };
        if entry.generation != generation {
            debug!(
                doc_id = document_id,
                generation,
                current_generation = entry.generation,
                "Dropping progress write from superseded job"
            );
            return false;
        }

        let current = entry.tx.borrow().clone();
        let next = update(&current);
        if !current.step.can_advance_to(next.step) {
            debug!(
                doc_id = document_id,
                from = current.step.label(),
                to = next.step.label(),
                "Dropping out-of-order progress write"
            );
            return false;
        }
        entry.tx.send_replace(next);
        true
    }

    /// Snapshot of the current state
    pub fn get(&self, document_id: i64) -> Option<ProgressState> {
        self.read()
            .get(&document_id)
            .map(|entry| entry.tx.borrow().clone())
    }

    /// Last-value receiver for a document's progress
    pub fn subscribe(&self, document_id: i64) -> Option<watch::Receiver<ProgressState>> {
        self.read().get(&document_id).map(|entry| entry.tx.subscribe())
    }

    /// Resolve once the document reaches a terminal step
    ///
    /// Returns `None` if the document is unknown or its entry is evicted
    /// before reaching a terminal step.
    pub async fn wait_for_terminal(&self, document_id: i64) -> Option<ProgressState> {
        let mut rx = self.subscribe(document_id)?;
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_terminal() {
                    return Some(state.clone());
                }
            }
            if rx.changed().await.is_err() {
                let state = rx.borrow().clone();
                return state.is_terminal().then_some(state);
            }
        }
    }

    /// Stream of snapshots, ending after the first terminal one
    ///
    /// Intermediate states may be skipped when writes outpace the consumer;
    /// the latest state is always delivered.
    pub fn stream(&self, document_id: i64) -> impl Stream<Item = ProgressState> + Send + 'static {
        let rx = self.subscribe(document_id);
        async_stream::stream! {
            let Some(mut rx) = rx else {
                return;
            };
            loop {
                let state = rx.borrow_and_update().clone();
                let terminal = state.is_terminal();
                yield state;
                if terminal || rx.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Evict expired entries, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let mut entries = self.write();
        let before = entries.len();

        entries.retain(|_, entry| {
            let state = entry.tx.borrow();
            let age = elapsed_since(state.last_updated);
            if state.is_terminal() {
                age <= self.terminal_ttl
            } else {
                age <= self.stale_ttl
            }
        });

        let removed = before - entries.len();
        if removed > 0 {
            debug!(removed, remaining = entries.len(), "Progress entries evicted");
        }
        removed
    }

    /// Start the periodic cleanup sweep; it runs until [`shutdown`](Self::shutdown)
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let token = self.shutdown.clone();
        let period = self.cleanup_interval;

        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            info!(interval_secs = period.as_secs(), "Progress cleanup task started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        manager.cleanup();
                    }
                }
            }

            info!("Progress cleanup task stopped");
        })
    }

    /// Stop the cleanup sweep
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Write handle for one job's progress
///
/// All writes are checked against the job's generation; once a newer job for
/// the same document begins they become no-ops.
#[derive(Clone)]
pub struct JobProgress {
    manager: Arc<ProgressManager>,
    document_id: i64,
    generation: u64,
    job_id: Uuid,
}

impl JobProgress {
    pub fn document_id(&self) -> i64 {
        self.document_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn in_progress(&self, percent: u8, message: impl Into<String>) -> bool {
        let message = message.into();
        self.manager
            .advance(self.document_id, self.generation, |current| {
                current.advanced(ProgressStep::InProgress, percent, message)
            })
    }

    pub fn complete(&self, result: &ScoreResult) -> bool {
        self.manager
            .advance(self.document_id, self.generation, |current| {
                let mut next = current.advanced(ProgressStep::Complete, 100, "Scoring complete");
                next.final_score = Some(result.composite_score);
                next.final_confidence = Some(result.confidence);
                next
            })
    }

    pub fn fail(&self, error: impl Into<String>) -> bool {
        let error = error.into();
        self.manager
            .advance(self.document_id, self.generation, |current| {
                let mut next =
                    current.advanced(ProgressStep::Error, current.percent, error.clone());
                next.error = Some(error);
                next
            })
    }

    /// Current state of the document (possibly a newer job's)
    pub fn snapshot(&self) -> Option<ProgressState> {
        self.manager.get(self.document_id)
    }
}
