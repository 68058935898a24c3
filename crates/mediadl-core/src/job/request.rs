//! Download request and snapshot DTOs.

use serde::{Deserialize, Serialize};

use super::types::{CacheKey, FailureReason, JobRecord, JobState};
use crate::requirements::Requirements;

/// Request to add a download.
///
/// Pure data; the orchestrator turns it into a QUEUED [`JobRecord`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    /// Caller-supplied stable id.
    pub id: String,
    /// Remote address of the resource.
    pub resource_uri: String,
    /// Caller bytes carried through unchanged.
    pub opaque_data: Vec<u8>,
    /// Representation qualifier folded into the cache key.
    pub variant: Option<String>,
    /// Explicit cache key overriding the URI-derived one.
    pub custom_cache_key: Option<String>,
}

impl DownloadRequest {
    /// Create a new download request with required fields.
    pub fn new(id: impl Into<String>, resource_uri: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_uri: resource_uri.into(),
            opaque_data: Vec::new(),
            variant: None,
            custom_cache_key: None,
        }
    }

    /// Attach opaque caller data.
    #[must_use]
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.opaque_data = data.into();
        self
    }

    /// Set the representation variant.
    #[must_use]
    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    /// Use an explicit cache key.
    #[must_use]
    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.custom_cache_key = Some(key.into());
        self
    }

    /// The cache key this request's bytes are stored under.
    #[must_use]
    pub fn cache_key(&self) -> CacheKey {
        self.custom_cache_key.as_ref().map_or_else(
            || CacheKey::for_resource(&self.resource_uri, self.variant.as_deref()),
            CacheKey::new,
        )
    }
}

/// A summary of one job for snapshots and list screens.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: String,
    pub state: JobState,
    pub percent: Option<f32>,
    pub bytes_downloaded: u64,
    pub content_length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Opaque data rendered as text.
    pub title: String,
}

impl From<&JobRecord> for JobSummary {
    fn from(record: &JobRecord) -> Self {
        Self {
            id: record.id.clone(),
            state: record.state,
            percent: record.percent,
            bytes_downloaded: record.bytes_downloaded,
            content_length: record.content_length,
            failure_reason: record.failure_reason,
            title: record.opaque_text(),
        }
    }
}

/// Snapshot of every job, shaped for a foreground progress indicator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownloadsSnapshot {
    /// All jobs in index order.
    pub items: Vec<JobSummary>,
    /// Number of DOWNLOADING jobs.
    pub downloading_count: u32,
    /// Number of QUEUED jobs.
    pub queued_count: u32,
    /// Aggregate completion across DOWNLOADING jobs with a known length.
    pub aggregate_percent: Option<f32>,
    /// Requirements currently blocking downloads.
    pub not_met_requirements: Requirements,
}

impl DownloadsSnapshot {
    /// Build a snapshot from index records.
    #[must_use]
    pub fn from_records(records: &[JobRecord], not_met_requirements: Requirements) -> Self {
        let mut downloading_count = 0u32;
        let mut queued_count = 0u32;
        let mut known_bytes = 0u64;
        let mut known_total = 0u64;

        for record in records {
            match record.state {
                JobState::Downloading => {
                    downloading_count += 1;
                    if let Some(total) = record.content_length {
                        known_bytes += record.bytes_downloaded.min(total);
                        known_total += total;
                    }
                }
                JobState::Queued => queued_count += 1,
                JobState::Stopped
                | JobState::Completed
                | JobState::Failed
                | JobState::Removing => {}
            }
        }

        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let aggregate_percent =
            (known_total > 0).then(|| (known_bytes as f64 / known_total as f64) as f32);

        Self {
            items: records.iter().map(JobSummary::from).collect(),
            downloading_count,
            queued_count,
            aggregate_percent,
            not_met_requirements,
        }
    }

    /// Whether any job still has work scheduled or running.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.downloading_count > 0 || self.queued_count > 0
    }
}
