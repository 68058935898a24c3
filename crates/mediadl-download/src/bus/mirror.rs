//! Observable in-memory mirror of job state.
//!
//! A listener that folds events into a [`MirrorSnapshot`] published on a
//! `watch` channel, so foreground UIs can render progress without touching
//! the index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use mediadl_core::{DeliveredEvent, FailureReason, JobEvent, JobListener, JobState, ListenerError};
use serde::Serialize;
use tokio::sync::watch;

/// Mirrored view of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorEntry {
    pub state: JobState,
    /// Completion in `[0, 1]`; an unknown length shows as zero.
    pub percent: f32,
    pub bytes_downloaded: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<FailureReason>,
    pub title: String,
}

/// All mirrored jobs plus the sequence number of the last applied event.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MirrorSnapshot {
    pub version: u64,
    pub jobs: BTreeMap<String, MirrorEntry>,
}

impl MirrorSnapshot {
    /// Whether any job is QUEUED or DOWNLOADING.
    pub fn is_busy(&self) -> bool {
        self.jobs
            .values()
            .any(|job| matches!(job.state, JobState::Queued | JobState::Downloading))
    }

    pub fn count(&self, state: JobState) -> usize {
        self.jobs.values().filter(|job| job.state == state).count()
    }
}

/// Listener maintaining the observable mirror.
pub struct DownloadStateMirror {
    tx: watch::Sender<MirrorSnapshot>,
}

impl Default for DownloadStateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadStateMirror {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(MirrorSnapshot::default());
        Self { tx }
    }

    /// Receiver that wakes on every applied event.
    pub fn subscribe(&self) -> watch::Receiver<MirrorSnapshot> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        self.tx.borrow().clone()
    }

    pub fn get(&self, id: &str) -> Option<MirrorEntry> {
        self.tx.borrow().jobs.get(id).cloned()
    }

    fn apply(&self, event: &DeliveredEvent) -> bool {
        self.tx.send_if_modified(|snapshot| {
            if event.seq <= snapshot.version {
                return false;
            }
            snapshot.version = event.seq;
            match &event.event {
                JobEvent::Changed(change) => {
                    snapshot.jobs.insert(
                        change.id.clone(),
                        MirrorEntry {
                            state: change.state,
                            percent: change.percent.unwrap_or(0.0),
                            bytes_downloaded: change.bytes_downloaded,
                            failure_reason: change.failure_reason,
                            title: String::from_utf8_lossy(&change.opaque_data).into_owned(),
                        },
                    );
                }
                JobEvent::Removed { id } => {
                    snapshot.jobs.remove(id);
                }
            }
            true
        })
    }
}

#[async_trait]
impl JobListener for DownloadStateMirror {
    fn name(&self) -> &str {
        "state-mirror"
    }

    async fn on_event(&self, event: &DeliveredEvent) -> Result<(), ListenerError> {
        self.apply(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_core::{CacheKey, JobChanged, JobRecord};

    fn changed(seq: u64, id: &str, state: JobState) -> DeliveredEvent {
        let mut record = JobRecord::new(id, "u", CacheKey::new(id), b"Title".to_vec(), 0);
        record.state = state;
        DeliveredEvent {
            seq,
            event: JobEvent::Changed(JobChanged::from_record(&record, None)),
        }
    }

    #[test]
    fn test_mirror_applies_events_in_order() {
        let mirror = DownloadStateMirror::new();
        assert!(mirror.apply(&changed(1, "a", JobState::Queued)));
        assert!(mirror.apply(&changed(2, "a", JobState::Downloading)));
        // Stale event is ignored.
        assert!(!mirror.apply(&changed(1, "a", JobState::Queued)));

        let entry = mirror.get("a").unwrap();
        assert_eq!(entry.state, JobState::Downloading);
        assert!(entry.percent.abs() < f32::EPSILON);
        assert_eq!(entry.title, "Title");
        assert!(mirror.snapshot().is_busy());

        mirror.apply(&DeliveredEvent {
            seq: 3,
            event: JobEvent::Removed { id: "a".into() },
        });
        assert!(mirror.get("a").is_none());
        assert_eq!(mirror.snapshot().version, 3);
    }
}
