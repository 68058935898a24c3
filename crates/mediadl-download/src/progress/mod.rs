//! Progress tracking and throttling.
//!
//! Workers publish raw byte counts on a `watch` channel; the orchestrator's
//! bridge task coalesces them before touching the index or the bus.

mod throttle;

pub use throttle::ProgressThrottle;

/// Progress update sent through the watch channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Bytes of the resource present in the cache.
    pub downloaded: u64,
    /// Total resource length, once known.
    pub total: Option<u64>,
    /// Monotonically increasing sequence number for change detection.
    pub seq: u64,
}

impl ProgressUpdate {
    /// Create a new progress update with a sequence number.
    pub const fn new(downloaded: u64, total: Option<u64>, seq: u64) -> Self {
        Self {
            downloaded,
            total,
            seq,
        }
    }
}
