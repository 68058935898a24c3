//! Startup recovery from the durable index.

use mediadl_core::{DownloadError, JobChanged, JobEvent, JobState, StopReason};

use super::{DownloadOrchestrator, index_error};

/// What [`DownloadOrchestrator::restore`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreSummary {
    /// Records loaded from the index.
    pub loaded: usize,
    /// DOWNLOADING jobs reset to QUEUED.
    pub reset: usize,
    /// Jobs placed in the scheduling queue.
    pub queued: usize,
    /// Interrupted removals that were finished.
    pub removed: usize,
}

impl DownloadOrchestrator {
    /// Rebuild scheduler state from the index and replay every record.
    ///
    /// No job is DOWNLOADING without a worker, so DOWNLOADING records left
    /// by a previous process become QUEUED again (behind existing queue
    /// entries). Interrupted removals are completed. Every surviving record
    /// is then published as a replay event so listeners can rebuild.
    pub async fn restore(&self) -> Result<RestoreSummary, DownloadError> {
        let _commands = self.commands.lock().await;
        let records = self.index.list_all().await.map_err(|e| index_error(&e))?;
        let mut summary = RestoreSummary {
            loaded: records.len(),
            ..RestoreSummary::default()
        };

        let mut state = self.state.lock().await;
        state.next_queue_seq = records
            .iter()
            .map(|r| r.queue_seq + 1)
            .max()
            .unwrap_or(0)
            .max(state.next_queue_seq);
        let requirements_met = self.config.required.not_met(state.met).is_empty();

        let mut queued: Vec<_> = records
            .iter()
            .filter(|r| r.state == JobState::Queued)
            .collect();
        queued.sort_by_key(|r| r.queue_seq);
        for record in queued {
            state.queue.push(&record.id, record.queue_seq, None);
            summary.queued += 1;
        }

        let mut removing = Vec::new();
        for record in &records {
            match record.state {
                JobState::Downloading => {
                    let seq = state.next_seq();
                    self.persist_transition(record, JobState::Queued, |r| r.queue_seq = seq)
                        .await?;
                    state.queue.push(&record.id, seq, None);
                    summary.reset += 1;
                    summary.queued += 1;
                    tracing::info!(id = %record.id, "Interrupted download re-queued");
                }
                JobState::Stopped
                    if requirements_met
                        && record.stop_reason == Some(StopReason::RequirementsNotMet) =>
                {
                    let seq = state.next_seq();
                    self.persist_transition(record, JobState::Queued, |r| r.queue_seq = seq)
                        .await?;
                    state.queue.push(&record.id, seq, None);
                    summary.queued += 1;
                }
                JobState::Removing => removing.push(record.clone()),
                _ => {}
            }
        }
        drop(state);

        for record in &removing {
            match self.finish_removal(record).await {
                Ok(()) => summary.removed += 1,
                Err(e) => {
                    tracing::warn!(id = %record.id, error = %e, "Could not finish interrupted removal");
                }
            }
        }

        for record in self.index.list_all().await.map_err(|e| index_error(&e))? {
            self.bus
                .publish(JobEvent::Changed(JobChanged::replay(&record)));
        }

        tracing::info!(
            target: "mediadl.download",
            loaded = summary.loaded,
            reset = summary.reset,
            queued = summary.queued,
            removed = summary.removed,
            "Download index restored"
        );
        Ok(summary)
    }
}
