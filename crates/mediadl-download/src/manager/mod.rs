//! Download orchestrator.
//!
//! Owns every job transition. Commands, workers and the restore pass all go
//! through here, and each transition is persisted to the index before its
//! event is published, so listeners never see a state the index lacks.
//!
//! # Architecture
//!
//! - **Orchestrator**: scheduler state, leases, worker lifecycle
//! - **Worker**: fills cache gaps, writes only to a `watch::Sender`
//! - **Bridge tasks**: throttle worker progress into index writes and events
//!
//! # Concurrency Model
//!
//! - Single long-lived runner woken through `Notify`
//! - Lease tokens prevent stale finalize commits
//! - Lock order: commands → state (consistent everywhere)
//! - Per-job events are published while holding the state lock, which keeps
//!   them in persist order

mod commands;
mod restore;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use mediadl_core::{
    DownloadError, DownloadIndexPort, EngineConfig, JobChanged, JobEvent, JobRecord, JobState,
    Requirements, ResourceFetcherPort,
};
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::bus::ListenerBus;
use crate::cache::ContentCache;
use crate::progress::{ProgressThrottle, ProgressUpdate};
use crate::queue::JobQueue;

pub use restore::RestoreSummary;
pub use worker::{CompletedTransfer, TransferJob, WorkerDeps, run_transfer};

/// Lease ID for tracking active transfers.
///
/// Prevents stale finalize commits when a transfer is stopped or removed
/// while its worker is still winding down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct LeaseId(u64);

/// State for a DOWNLOADING job.
struct ActiveJob {
    lease: LeaseId,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// A finished transfer whose outcome could not be written to the index yet.
///
/// The record is still DOWNLOADING, so it keeps its slot until committed.
struct PendingOutcome {
    result: Result<CompletedTransfer, DownloadError>,
    retry_at: Instant,
}

/// Scheduler state, guarded by one lock.
struct SchedulerState {
    queue: JobQueue,
    active: HashMap<String, ActiveJob>,
    pending: HashMap<String, PendingOutcome>,
    met: Requirements,
    next_queue_seq: u64,
}

impl SchedulerState {
    const fn next_seq(&mut self) -> u64 {
        let seq = self.next_queue_seq;
        self.next_queue_seq += 1;
        seq
    }

    fn holds_lease(&self, id: &str, lease: LeaseId) -> bool {
        self.active.get(id).is_some_and(|job| job.lease == lease)
    }

    /// Jobs occupying a DOWNLOADING slot.
    fn occupied(&self) -> usize {
        self.active.len() + self.pending.len()
    }

    fn next_pending_retry(&self) -> Option<Instant> {
        self.pending.values().map(|p| p.retry_at).min()
    }
}

/// Concrete orchestrator behind `DownloadOrchestratorPort`.
///
/// Always used through an `Arc`; the runner, workers and bridges hold clones.
pub struct DownloadOrchestrator {
    config: EngineConfig,
    index: Arc<dyn DownloadIndexPort>,
    fetcher: Arc<dyn ResourceFetcherPort>,
    cache: ContentCache,
    bus: Arc<ListenerBus>,
    /// Serializes user commands against each other.
    commands: Mutex<()>,
    state: Mutex<SchedulerState>,
    lease_counter: AtomicU64,
    queue_notify: Notify,
    runner_started: AtomicBool,
    shutdown: CancellationToken,
}

fn index_error(e: &mediadl_core::RepositoryError) -> DownloadError {
    DownloadError::index_write(e.to_string())
}

impl DownloadOrchestrator {
    /// Create an orchestrator. Call [`Self::restore`] before starting it.
    ///
    /// All requirements are considered met until the platform reports
    /// otherwise through `update_met_requirements`.
    pub fn new(
        config: EngineConfig,
        index: Arc<dyn DownloadIndexPort>,
        fetcher: Arc<dyn ResourceFetcherPort>,
        cache: ContentCache,
        bus: Arc<ListenerBus>,
    ) -> Self {
        Self {
            config,
            index,
            fetcher,
            cache,
            bus,
            commands: Mutex::new(()),
            state: Mutex::new(SchedulerState {
                queue: JobQueue::new(),
                active: HashMap::new(),
                pending: HashMap::new(),
                met: Requirements::all(),
                next_queue_seq: 0,
            }),
            lease_counter: AtomicU64::new(0),
            queue_notify: Notify::new(),
            runner_started: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub const fn cache(&self) -> &ContentCache {
        &self.cache
    }

    /// Number of jobs with a live worker.
    pub async fn active_count(&self) -> usize {
        self.state.lock().await.active.len()
    }

    /// Queued job ids in scheduling order.
    pub async fn queued_ids(&self) -> Vec<String> {
        self.state.lock().await.queue.ids()
    }

    // =========================================================================
    // Persistence helpers
    // =========================================================================

    async fn load(&self, id: &str) -> Result<JobRecord, DownloadError> {
        self.index
            .get(id)
            .await
            .map_err(|e| index_error(&e))?
            .ok_or_else(|| DownloadError::not_found(id))
    }

    async fn persist(&self, record: &JobRecord) -> Result<(), DownloadError> {
        self.index.put(record).await.map_err(|e| {
            tracing::error!(id = %record.id, state = %record.state, error = %e, "Index write failed");
            index_error(&e)
        })
    }

    /// Validate and persist `record -> next`. Nothing is published.
    ///
    /// On failure the stored record is untouched.
    async fn persist_transition(
        &self,
        record: &JobRecord,
        next: JobState,
        edit: impl FnOnce(&mut JobRecord) + Send,
    ) -> Result<JobRecord, DownloadError> {
        if !record.state.can_transition_to(next) {
            return Err(DownloadError::invalid_transition(
                &record.id,
                record.state,
                next,
            ));
        }
        let mut updated = record.clone();
        updated.state = next;
        if next != JobState::Stopped {
            updated.stop_reason = None;
        }
        if next != JobState::Failed {
            updated.failure_reason = None;
        }
        edit(&mut updated);
        updated.updated_at = Utc::now();
        self.persist(&updated).await?;
        tracing::debug!(id = %updated.id, from = %record.state, to = %next, "Job transition");
        Ok(updated)
    }

    /// Persist a transition and publish it.
    async fn apply_transition(
        &self,
        record: &JobRecord,
        next: JobState,
        edit: impl FnOnce(&mut JobRecord) + Send,
    ) -> Result<JobRecord, DownloadError> {
        let updated = self.persist_transition(record, next, edit).await?;
        self.publish_changed(&updated, Some(record.state));
        Ok(updated)
    }

    fn publish_changed(&self, record: &JobRecord, previous: Option<JobState>) {
        self.bus
            .publish(JobEvent::Changed(JobChanged::from_record(record, previous)));
    }

    // =========================================================================
    // Runner
    // =========================================================================

    /// Start the scheduling loop. Idempotent.
    pub fn ensure_runner(self: &Arc<Self>) {
        if self
            .runner_started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let orchestrator = Arc::clone(self);
            tokio::spawn(async move {
                orchestrator.run_loop().await;
            });
        }
    }

    async fn run_loop(self: Arc<Self>) {
        tracing::info!(
            target: "mediadl.download",
            max_parallel = self.config.max_parallel_downloads,
            "Download runner started"
        );
        loop {
            let next_wake = self.fill_slots().await;
            let delayed = async {
                match next_wake {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = self.queue_notify.notified() => {}
                () = delayed => {}
            }
        }
        tracing::info!(target: "mediadl.download", "Download runner stopped");
    }

    /// Start queued jobs while slots are free and requirements are met.
    ///
    /// Returns when the runner should wake for a delayed retry.
    async fn fill_slots(self: &Arc<Self>) -> Option<Instant> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        self.retry_pending_outcomes(&mut state, now).await;
        if !self.config.required.not_met(state.met).is_empty() {
            return state.next_pending_retry();
        }

        while state.occupied() < self.config.max_parallel_downloads {
            let Some(id) = state.queue.pop_ready(now) else {
                break;
            };
            let record = match self.index.get(&id).await {
                Ok(Some(record)) if record.state == JobState::Queued => record,
                Ok(_) => {
                    tracing::debug!(id = %id, "Skipping queue entry that is no longer QUEUED");
                    continue;
                }
                Err(e) => {
                    tracing::error!(id = %id, error = %e, "Could not load queued job");
                    let seq = state.next_seq();
                    state
                        .queue
                        .push(&id, seq, Some(now + self.config.retry_delay));
                    break;
                }
            };

            match self
                .persist_transition(&record, JobState::Downloading, |_| {})
                .await
            {
                Ok(updated) => {
                    self.publish_changed(&updated, Some(JobState::Queued));
                    self.spawn_worker(&mut state, updated);
                }
                Err(_) => {
                    // Still QUEUED in the index; try again later.
                    state.queue.push(
                        &record.id,
                        record.queue_seq,
                        Some(now + self.config.retry_delay),
                    );
                    break;
                }
            }
        }
        [state.queue.next_ready_after(now), state.next_pending_retry()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Commit outcomes whose earlier index write failed and whose delay is up.
    async fn retry_pending_outcomes(&self, state: &mut SchedulerState, now: Instant) {
        let due: Vec<String> = state
            .pending
            .iter()
            .filter(|(_, p)| p.retry_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in due {
            let Some(pending) = state.pending.remove(&id) else {
                continue;
            };
            tracing::debug!(id = %id, "Retrying transfer outcome commit");
            self.commit_outcome(state, &id, pending.result).await;
        }
    }

    fn spawn_worker(self: &Arc<Self>, state: &mut SchedulerState, record: JobRecord) {
        let lease = LeaseId(self.lease_counter.fetch_add(1, Ordering::Relaxed));
        let cancel = self.shutdown.child_token();
        let (progress_tx, progress_rx) = watch::channel(ProgressUpdate::new(
            record.bytes_downloaded,
            record.content_length,
            0,
        ));
        let bridge =
            self.spawn_progress_bridge(record.id.clone(), lease, progress_rx, cancel.clone());

        let job = TransferJob {
            id: record.id.clone(),
            resource_uri: record.resource_uri.clone(),
            cache_key: record.cache_key.clone(),
            cancel: cancel.clone(),
            progress_tx,
        };
        let deps = WorkerDeps {
            cache: self.cache.clone(),
            fetcher: Arc::clone(&self.fetcher),
        };
        let orchestrator = Arc::clone(self);
        let id = record.id.clone();
        let handle = tokio::spawn(async move {
            let result = run_transfer(job, &deps).await;
            // Progress writes settle before the outcome is committed.
            let _ = bridge.await;
            orchestrator.finalize_job(&id, lease, result).await;
        });

        tracing::info!(id = %record.id, uri = %record.resource_uri, "Download started");
        state.active.insert(
            record.id,
            ActiveJob {
                lease,
                cancel,
                handle,
            },
        );
    }

    /// Spawn a bridge that turns worker progress into index writes and events.
    fn spawn_progress_bridge(
        self: &Arc<Self>,
        id: String,
        lease: LeaseId,
        mut rx: watch::Receiver<ProgressUpdate>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        let mut throttle = ProgressThrottle::new(
            self.config.progress_interval,
            self.config.progress_byte_quantum,
        );
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let update = rx.borrow_and_update().clone();
                        if update.seq > 0 && throttle.should_emit(update.downloaded) {
                            orchestrator.record_progress(&id, lease, &update).await;
                        }
                    }
                }
            }
        })
    }

    async fn record_progress(&self, id: &str, lease: LeaseId, update: &ProgressUpdate) {
        let state = self.state.lock().await;
        if !state.holds_lease(id, lease) {
            return;
        }
        let mut record = match self.index.get(id).await {
            Ok(Some(record)) if record.state == JobState::Downloading => record,
            _ => return,
        };
        record.set_progress(update.downloaded, update.total);
        record.updated_at = Utc::now();
        if let Err(e) = self.index.put(&record).await {
            tracing::warn!(id = %id, error = %e, "Could not persist progress");
            return;
        }
        self.publish_changed(&record, Some(JobState::Downloading));
        drop(state);
    }

    /// Commit a worker's outcome if its lease is still current.
    async fn finalize_job(
        &self,
        id: &str,
        lease: LeaseId,
        result: Result<CompletedTransfer, DownloadError>,
    ) {
        let mut state = self.state.lock().await;
        if !state.holds_lease(id, lease) {
            tracing::debug!(id = %id, "Ignoring outcome of a superseded transfer");
            return;
        }
        state.active.remove(id);
        self.commit_outcome(&mut state, id, result).await;
        drop(state);
        self.queue_notify.notify_one();
    }

    /// Persist and publish a finished transfer's outcome. Caller holds the
    /// state lock and has already released the job's lease.
    ///
    /// When the index cannot be read or written the outcome is parked and
    /// retried by the runner after `retry_delay`.
    async fn commit_outcome(
        &self,
        state: &mut SchedulerState,
        id: &str,
        result: Result<CompletedTransfer, DownloadError>,
    ) {
        let record = match self.index.get(id).await {
            Ok(Some(record)) if record.state == JobState::Downloading => record,
            Ok(other) => {
                tracing::warn!(id = %id, state = ?other.map(|r| r.state), "Finished job is no longer DOWNLOADING");
                return;
            }
            Err(e) => {
                tracing::error!(id = %id, error = %e, "Could not load finished job");
                self.park_outcome(state, id, result);
                return;
            }
        };

        let committed = match &result {
            Ok(done) => self
                .apply_transition(&record, JobState::Completed, |r| {
                    r.set_progress(done.bytes, Some(done.content_length));
                    r.retry_count = 0;
                    r.failure_message = None;
                })
                .await
                .map(|_| tracing::info!(id = %id, bytes = done.bytes, "Download completed")),
            Err(e) if e.is_cancelled() => {
                tracing::info!(id = %id, "Transfer cancelled");
                Ok(())
            }
            Err(e) if e.is_recoverable() && record.retry_count < self.config.max_retries => {
                let seq = state.next_seq();
                let downloaded = self.cache.cached_bytes(&record.cache_key);
                let total = self.cache.content_length(&record.cache_key);
                let requeued = self
                    .apply_transition(&record, JobState::Queued, |r| {
                        r.retry_count += 1;
                        r.queue_seq = seq;
                        r.failure_message = Some(e.to_string());
                        r.set_progress(downloaded, total);
                    })
                    .await;
                if requeued.is_ok() {
                    state
                        .queue
                        .push(id, seq, Some(Instant::now() + self.config.retry_delay));
                    tracing::warn!(
                        id = %id,
                        error = %e,
                        attempt = record.retry_count + 1,
                        "Transfer failed, re-queued"
                    );
                }
                requeued.map(|_| ())
            }
            Err(e) => {
                let reason = e.failure_reason();
                tracing::warn!(id = %id, error = %e, reason = %reason.as_str(), "Download failed");
                self.apply_transition(&record, JobState::Failed, |r| {
                    r.failure_reason = Some(reason);
                    r.failure_message = Some(e.to_string());
                })
                .await
                .map(|_| ())
            }
        };
        if let Err(e) = committed {
            tracing::error!(id = %id, error = %e, "Could not commit transfer outcome");
            self.park_outcome(state, id, result);
        }
    }

    fn park_outcome(
        &self,
        state: &mut SchedulerState,
        id: &str,
        result: Result<CompletedTransfer, DownloadError>,
    ) {
        state.pending.insert(
            id.to_string(),
            PendingOutcome {
                result,
                retry_at: Instant::now() + self.config.retry_delay,
            },
        );
    }

    /// Cancel a worker and wait (bounded) for it to wind down.
    async fn stop_worker(&self, id: &str, mut job: ActiveJob) {
        job.cancel.cancel();
        if tokio::time::timeout(self.config.cancel_timeout, &mut job.handle)
            .await
            .is_err()
        {
            tracing::warn!(id = %id, "Worker did not stop in time, aborting");
            job.handle.abort();
            let _ = job.handle.await;
        }
    }

    /// Stop the runner and every worker.
    ///
    /// DOWNLOADING records stay as they are, including those whose outcome
    /// was never committed; the next [`Self::restore`] re-queues them.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let active: Vec<(String, ActiveJob)> = {
            let mut state = self.state.lock().await;
            state.pending.clear();
            state.active.drain().collect()
        };
        for (id, job) in active {
            self.stop_worker(&id, job).await;
        }
        tracing::info!(target: "mediadl.download", "Download orchestrator shut down");
    }
}
