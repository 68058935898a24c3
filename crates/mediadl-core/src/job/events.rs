//! Job events - discriminated union for everything published on the listener bus.

use serde::{Deserialize, Serialize};

use super::types::{FailureReason, JobRecord, JobState, StopReason};

/// A job's state or progress changed.
///
/// Always describes a state that is already durable in the download index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobChanged {
    /// The job id.
    pub id: String,
    /// State after the change.
    pub state: JobState,
    /// State before the change; equal to `state` for progress-only updates,
    /// `None` when the job was just created or the event is a replay.
    pub previous_state: Option<JobState>,
    /// Completion in `[0, 1]`, `None` while the total length is unknown.
    pub percent: Option<f32>,
    /// Bytes present in the cache.
    pub bytes_downloaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    /// Caller bytes from the job's request.
    pub opaque_data: Vec<u8>,
    /// Set when the event re-announces persisted state after a restart.
    pub replay: bool,
}

impl JobChanged {
    /// Describe `record` after a change from `previous_state`.
    #[must_use]
    pub fn from_record(record: &JobRecord, previous_state: Option<JobState>) -> Self {
        Self {
            id: record.id.clone(),
            state: record.state,
            previous_state,
            percent: record.percent,
            bytes_downloaded: record.bytes_downloaded,
            stop_reason: record.stop_reason,
            failure_reason: record.failure_reason,
            opaque_data: record.opaque_data.clone(),
            replay: false,
        }
    }

    /// Re-announce `record` as it was loaded from the index.
    #[must_use]
    pub fn replay(record: &JobRecord) -> Self {
        Self {
            replay: true,
            ..Self::from_record(record, None)
        }
    }

    /// Whether this event carries a state transition (not just progress).
    #[must_use]
    pub fn is_transition(&self) -> bool {
        !self.replay && self.previous_state != Some(self.state)
    }

    /// Whether this event reports the job entering a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

/// Single discriminated union for all bus events.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job's state or progress changed.
    Changed(JobChanged),
    /// A job's record and exclusive cache bytes were deleted.
    Removed {
        /// The removed job id.
        id: String,
    },
}

impl JobEvent {
    /// The job this event concerns.
    #[must_use]
    pub fn job_id(&self) -> &str {
        match self {
            Self::Changed(changed) => &changed.id,
            Self::Removed { id } => id,
        }
    }
}

/// An event as delivered to a listener, stamped with its publish order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveredEvent {
    /// Global publish sequence number, strictly increasing per bus.
    pub seq: u64,
    /// The event payload.
    pub event: JobEvent,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::CacheKey;

    #[test]
    fn test_changed_from_record() {
        let mut record =
            JobRecord::new("v1", "https://x/y", CacheKey::new("k"), b"Title".to_vec(), 3);
        record.state = JobState::Downloading;
        record.set_progress(10, Some(100));

        let changed = JobChanged::from_record(&record, Some(JobState::Queued));
        assert!(changed.is_transition());
        assert!(!changed.is_terminal());
        assert_eq!(changed.percent, Some(0.1));
        assert_eq!(changed.opaque_data, b"Title".to_vec());
        assert!(!changed.replay);

        let progress = JobChanged::from_record(&record, Some(JobState::Downloading));
        assert!(!progress.is_transition());

        let replay = JobChanged::replay(&record);
        assert!(replay.replay);
        assert_eq!(replay.previous_state, None);
        assert!(!replay.is_transition());
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = JobEvent::Removed { id: "gone".into() };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"removed\""));
        assert_eq!(event.job_id(), "gone");
    }
}
