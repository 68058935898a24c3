//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::requirements::Requirements;

/// Default cache budget: 100 MiB.
pub const DEFAULT_CACHE_BUDGET_BYTES: u64 = 100 * 1024 * 1024;
/// Default number of concurrently DOWNLOADING jobs.
pub const DEFAULT_MAX_PARALLEL_DOWNLOADS: usize = 2;
/// Default number of automatic re-queues before a job settles into FAILED.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Configuration for the download orchestrator and its content cache.
///
/// Contains paths and limits the engine needs. Collaborators (index, fetcher,
/// signal sink) are injected separately.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory for the cache and the index database.
    pub data_dir: PathBuf,
    /// Upper bound on the sum of all cached span lengths.
    pub cache_budget_bytes: u64,
    /// Maximum concurrent DOWNLOADING jobs (`W`).
    pub max_parallel_downloads: usize,
    /// Automatic re-queues allowed for recoverable errors.
    pub max_retries: u32,
    /// Delay before a re-queued job becomes eligible again.
    pub retry_delay: Duration,
    /// Minimum interval between progress reports for one job.
    pub progress_interval: Duration,
    /// Byte quantum that also triggers a progress report.
    pub progress_byte_quantum: u64,
    /// Bounded wait for a cancelled worker to acknowledge.
    pub cancel_timeout: Duration,
    /// Chunk size used when streaming cached spans back out.
    pub chunk_size: usize,
    /// Requirements every job needs to be DOWNLOADING.
    pub required: Requirements,
    /// First id handed to terminal-state signals.
    pub first_notification_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            max_parallel_downloads: DEFAULT_MAX_PARALLEL_DOWNLOADS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(1),
            progress_interval: Duration::from_secs(1),
            progress_byte_quantum: 4 * 1024 * 1024,
            cancel_timeout: Duration::from_secs(5),
            chunk_size: 64 * 1024,
            required: Requirements::NETWORK,
            first_notification_id: 2,
        }
    }
}

impl EngineConfig {
    /// Create a new config rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            ..Default::default()
        }
    }

    /// Directory holding cached spans.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }

    /// Path of the `SQLite` index database.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("mediadl.db")
    }

    /// Set the cache budget in bytes.
    #[must_use]
    pub const fn with_cache_budget(mut self, bytes: u64) -> Self {
        self.cache_budget_bytes = bytes;
        self
    }

    /// Set the maximum concurrent downloads. Zero is clamped to one.
    #[must_use]
    pub fn with_max_parallel_downloads(mut self, max: usize) -> Self {
        self.max_parallel_downloads = max.max(1);
        self
    }

    /// Set the automatic retry bound.
    #[must_use]
    pub const fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// Set the delay applied to automatic re-queues.
    #[must_use]
    pub const fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Set the progress coalescing interval and byte quantum.
    #[must_use]
    pub const fn with_progress_coalescing(mut self, interval: Duration, byte_quantum: u64) -> Self {
        self.progress_interval = interval;
        self.progress_byte_quantum = byte_quantum;
        self
    }

    /// Set the bounded wait for worker cancellation.
    #[must_use]
    pub const fn with_cancel_timeout(mut self, timeout: Duration) -> Self {
        self.cancel_timeout = timeout;
        self
    }

    /// Set the read chunk size. Zero is clamped to one.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set the required conditions.
    #[must_use]
    pub const fn with_required(mut self, required: Requirements) -> Self {
        self.required = required;
        self
    }

    /// Set the first terminal-signal notification id.
    #[must_use]
    pub const fn with_first_notification_id(mut self, id: u64) -> Self {
        self.first_notification_id = id;
        self
    }
}
