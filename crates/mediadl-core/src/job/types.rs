//! Job record and state machine types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Lifecycle state of a download job.
///
/// The allowed edges are encoded in [`JobState::can_transition_to`]; every
/// state change applied by the orchestrator is checked against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker slot.
    Queued,
    /// A worker is transferring bytes.
    Downloading,
    /// Paused, either manually or because a requirement is not met.
    Stopped,
    /// All bytes are present in the cache.
    Completed,
    /// Gave up after an unrecoverable error or exhausted retries.
    Failed,
    /// Being deleted; the id is not reusable until the record is gone.
    Removing,
}

impl JobState {
    /// Convert to string representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Downloading => "downloading",
            Self::Stopped => "stopped",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Removing => "removing",
        }
    }

    /// Parse from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "downloading" => Some(Self::Downloading),
            "stopped" => Some(Self::Stopped),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "removing" => Some(Self::Removing),
            _ => None,
        }
    }

    /// Whether no further automatic transition occurs from this state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is an edge of the job state machine.
    ///
    /// `Downloading -> Queued` covers both automatic re-queues after a
    /// recoverable error and the reset performed on process restart.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        match (self, next) {
            (Self::Removing, _) => false,
            (_, Self::Removing) => true,
            (Self::Queued, Self::Downloading)
            | (
                Self::Downloading,
                Self::Stopped | Self::Completed | Self::Failed | Self::Queued,
            )
            | (Self::Stopped, Self::Queued) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job is STOPPED.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Paused by an explicit command.
    Manual,
    /// A required condition (network, charging, ...) stopped holding.
    RequirementsNotMet,
}

impl StopReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::RequirementsNotMet => "requirements_not_met",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Self::Manual),
            "requirements_not_met" => Some(Self::RequirementsNotMet),
            _ => None,
        }
    }
}

/// Why a job is FAILED.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient transfer errors kept recurring past the retry bound.
    TransientTransfer,
    /// The cache could not make room because every span was pinned.
    CacheFull,
    /// Any other non-recoverable error.
    Unrecoverable,
}

impl FailureReason {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransientTransfer => "transient_transfer",
            Self::CacheFull => "cache_full",
            Self::Unrecoverable => "unrecoverable",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transient_transfer" => Some(Self::TransientTransfer),
            "cache_full" => Some(Self::CacheFull),
            "unrecoverable" => Some(Self::Unrecoverable),
            _ => None,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a cached resource.
///
/// Derived from the resource URI, optionally qualified by a variant when the
/// resource has several representations.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an explicit key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Derive the key for a resource URI and optional variant.
    #[must_use]
    pub fn for_resource(uri: &str, variant: Option<&str>) -> Self {
        match variant {
            Some(v) if !v.is_empty() => Self(format!("{uri}#{v}")),
            _ => Self(uri.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe digest of the key, used to name its cache directory.
    #[must_use]
    pub fn digest(&self) -> String {
        let hash = Sha256::digest(self.0.as_bytes());
        hash.iter().take(16).map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Durable record of one requested download.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Caller-supplied identity, stable for the lifetime of the job.
    pub id: String,
    /// Remote address of the resource.
    pub resource_uri: String,
    /// Cache identity of the resource bytes.
    pub cache_key: CacheKey,
    /// Current lifecycle state.
    pub state: JobState,
    /// Completion in `[0, 1]`, `None` while the total length is unknown.
    pub percent: Option<f32>,
    /// Bytes of the resource present in the cache.
    pub bytes_downloaded: u64,
    /// Total resource length once known.
    pub content_length: Option<u64>,
    /// Set while the job is STOPPED.
    pub stop_reason: Option<StopReason>,
    /// Set while the job is FAILED.
    pub failure_reason: Option<FailureReason>,
    /// Last error message behind `failure_reason`.
    pub failure_message: Option<String>,
    /// Caller bytes carried through unchanged (e.g. a display title).
    pub opaque_data: Vec<u8>,
    /// Automatic re-queues performed since the last success or manual resume.
    pub retry_count: u32,
    /// Ordering key of the most recent transition into QUEUED.
    pub queue_seq: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a fresh QUEUED record.
    pub fn new(
        id: impl Into<String>,
        resource_uri: impl Into<String>,
        cache_key: CacheKey,
        opaque_data: Vec<u8>,
        queue_seq: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            resource_uri: resource_uri.into(),
            cache_key,
            state: JobState::Queued,
            percent: None,
            bytes_downloaded: 0,
            content_length: None,
            stop_reason: None,
            failure_reason: None,
            failure_message: None,
            opaque_data,
            retry_count: 0,
            queue_seq,
            created_at: now,
            updated_at: now,
        }
    }

    /// The opaque data rendered as UTF-8 (lossy), e.g. for a notification title.
    #[must_use]
    pub fn opaque_text(&self) -> String {
        String::from_utf8_lossy(&self.opaque_data).into_owned()
    }

    /// Record transferred bytes and recompute the percentage.
    pub fn set_progress(&mut self, bytes_downloaded: u64, content_length: Option<u64>) {
        self.bytes_downloaded = bytes_downloaded;
        if content_length.is_some() {
            self.content_length = content_length;
        }
        self.percent = self.content_length.map(|total| {
            if total == 0 {
                1.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let ratio = bytes_downloaded.min(total) as f64 / total as f64;
                #[allow(clippy::cast_possible_truncation)]
                let ratio = ratio as f32;
                ratio
            }
        });
    }

    /// Percentage for display, with "unset" shown as zero.
    #[must_use]
    pub fn display_percent(&self) -> f32 {
        self.percent.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_string_roundtrip() {
        for state in [
            JobState::Queued,
            JobState::Downloading,
            JobState::Stopped,
            JobState::Completed,
            JobState::Failed,
            JobState::Removing,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse("bogus"), None);
    }

    #[test]
    fn test_allowed_edges() {
        use JobState::*;
        assert!(Queued.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Stopped));
        assert!(Stopped.can_transition_to(Queued));
        assert!(Downloading.can_transition_to(Completed));
        assert!(Downloading.can_transition_to(Failed));
        assert!(Downloading.can_transition_to(Queued));
        assert!(Completed.can_transition_to(Removing));
        assert!(Queued.can_transition_to(Removing));
    }

    #[test]
    fn test_forbidden_edges() {
        use JobState::*;
        assert!(!Queued.can_transition_to(Stopped));
        assert!(!Queued.can_transition_to(Completed));
        assert!(!Stopped.can_transition_to(Downloading));
        assert!(!Completed.can_transition_to(Queued));
        assert!(!Failed.can_transition_to(Queued));
        assert!(!Removing.can_transition_to(Queued));
        assert!(!Removing.can_transition_to(Removing));
    }

    #[test]
    fn test_cache_key_variant() {
        let plain = CacheKey::for_resource("https://a/b.mp4", None);
        let variant = CacheKey::for_resource("https://a/b.mp4", Some("720p"));
        assert_eq!(plain.as_str(), "https://a/b.mp4");
        assert_eq!(variant.as_str(), "https://a/b.mp4#720p");
        assert_ne!(plain.digest(), variant.digest());
        assert_eq!(plain.digest().len(), 32);
    }

    #[test]
    fn test_progress_percent() {
        let mut record = JobRecord::new("a", "uri", CacheKey::new("uri"), vec![], 0);
        record.set_progress(50, None);
        assert_eq!(record.percent, None);
        assert!(record.display_percent().abs() < f32::EPSILON);

        record.set_progress(50, Some(200));
        assert_eq!(record.percent, Some(0.25));

        // Length stays known once learned.
        record.set_progress(200, None);
        assert_eq!(record.percent, Some(1.0));
    }
}
