//! User commands: the `DownloadOrchestratorPort` surface.

use async_trait::async_trait;
use chrono::Utc;
use mediadl_core::{
    DownloadError, DownloadOrchestratorPort, DownloadRequest, DownloadsSnapshot, JobEvent,
    JobRecord, JobState, RepositoryError, Requirements, StopReason,
};

use super::{DownloadOrchestrator, SchedulerState, index_error};

impl DownloadOrchestrator {
    /// STOPPED → QUEUED with a fresh queue position. Caller holds the state lock.
    async fn requeue_stopped(
        &self,
        state: &mut SchedulerState,
        record: &JobRecord,
    ) -> Result<JobRecord, DownloadError> {
        let seq = state.next_seq();
        let updated = self
            .apply_transition(record, JobState::Queued, |r| {
                r.queue_seq = seq;
                r.retry_count = 0;
                r.failure_message = None;
            })
            .await?;
        state.queue.push(&updated.id, seq, None);
        Ok(updated)
    }

    async fn remove_locked(&self, id: &str) -> Result<(), DownloadError> {
        let mut state = self.state.lock().await;
        let record = self.load(id).await?;
        let removing = if record.state == JobState::Removing {
            record
        } else {
            self.apply_transition(&record, JobState::Removing, |_| {})
                .await?
        };
        state.queue.remove(id);
        state.pending.remove(id);
        let active = state.active.remove(id);
        drop(state);

        if let Some(job) = active {
            self.stop_worker(id, job).await;
        }
        self.finish_removal(&removing).await
    }

    /// Purge a REMOVING job's exclusive cache bytes and delete its record.
    ///
    /// If this fails the record stays REMOVING and the next restore retries.
    pub(super) async fn finish_removal(&self, record: &JobRecord) -> Result<(), DownloadError> {
        let records = self.index.list_all().await.map_err(|e| index_error(&e))?;
        let shared = records
            .iter()
            .any(|other| other.id != record.id && other.cache_key == record.cache_key);
        let freed = if shared {
            0
        } else {
            self.cache.remove_key(&record.cache_key).await?
        };

        match self.index.remove(&record.id).await {
            Ok(()) | Err(RepositoryError::NotFound(_)) => {}
            Err(e) => return Err(index_error(&e)),
        }
        self.bus.publish(JobEvent::Removed {
            id: record.id.clone(),
        });
        tracing::info!(id = %record.id, freed, shared_cache = shared, "Download removed");
        Ok(())
    }
}

#[async_trait]
impl DownloadOrchestratorPort for DownloadOrchestrator {
    async fn add_download(&self, request: DownloadRequest) -> Result<JobRecord, DownloadError> {
        let _commands = self.commands.lock().await;
        if let Some(existing) = self
            .index
            .get(&request.id)
            .await
            .map_err(|e| index_error(&e))?
        {
            tracing::debug!(id = %existing.id, state = %existing.state, "Download already known");
            return Ok(existing);
        }

        let mut state = self.state.lock().await;
        let seq = state.next_seq();
        let cache_key = request.cache_key();
        let record = JobRecord::new(
            request.id,
            request.resource_uri,
            cache_key,
            request.opaque_data,
            seq,
        );
        self.persist(&record).await?;
        state.queue.push(&record.id, seq, None);
        self.publish_changed(&record, None);
        drop(state);

        tracing::info!(id = %record.id, uri = %record.resource_uri, "Download queued");
        self.queue_notify.notify_one();
        Ok(record)
    }

    async fn pause_download(&self, id: &str) -> Result<JobRecord, DownloadError> {
        let _commands = self.commands.lock().await;
        let mut state = self.state.lock().await;
        let record = self.load(id).await?;

        match record.state {
            JobState::Downloading => {}
            JobState::Stopped if record.stop_reason == Some(StopReason::Manual) => {
                return Ok(record);
            }
            JobState::Stopped => {
                // A requirements stop becomes a manual one, so it is not
                // resumed automatically.
                let mut updated = record.clone();
                updated.stop_reason = Some(StopReason::Manual);
                updated.updated_at = Utc::now();
                self.persist(&updated).await?;
                self.publish_changed(&updated, Some(JobState::Stopped));
                return Ok(updated);
            }
            other => {
                return Err(DownloadError::invalid_transition(
                    id,
                    other,
                    JobState::Stopped,
                ));
            }
        }

        let updated = self
            .persist_transition(&record, JobState::Stopped, |r| {
                r.stop_reason = Some(StopReason::Manual);
            })
            .await?;
        state.pending.remove(id);
        let active = state.active.remove(id);
        drop(state);

        if let Some(job) = active {
            self.stop_worker(id, job).await;
        }
        let downloaded = self.cache.cached_bytes(&updated.cache_key);
        tracing::info!(id = %id, downloaded, "Download paused");
        self.publish_changed(&updated, Some(JobState::Downloading));
        self.queue_notify.notify_one();
        Ok(updated)
    }

    async fn resume_download(&self, id: &str) -> Result<JobRecord, DownloadError> {
        let _commands = self.commands.lock().await;
        let mut state = self.state.lock().await;
        let record = self.load(id).await?;

        match record.state {
            JobState::Stopped => {}
            JobState::Queued | JobState::Downloading => return Ok(record),
            other => {
                return Err(DownloadError::invalid_transition(
                    id,
                    other,
                    JobState::Queued,
                ));
            }
        }
        let updated = self.requeue_stopped(&mut state, &record).await?;
        drop(state);

        tracing::info!(id = %id, "Download resumed");
        self.queue_notify.notify_one();
        Ok(updated)
    }

    async fn resume_all(&self) -> Result<usize, DownloadError> {
        let _commands = self.commands.lock().await;
        let mut state = self.state.lock().await;
        let records = self.index.list_all().await.map_err(|e| index_error(&e))?;

        let mut resumed = 0;
        for record in records.iter().filter(|r| r.state == JobState::Stopped) {
            self.requeue_stopped(&mut state, record).await?;
            resumed += 1;
        }
        drop(state);

        tracing::info!(resumed, "Resumed stopped downloads");
        self.queue_notify.notify_one();
        Ok(resumed)
    }

    async fn remove_download(&self, id: &str) -> Result<(), DownloadError> {
        let _commands = self.commands.lock().await;
        self.remove_locked(id).await?;
        self.queue_notify.notify_one();
        Ok(())
    }

    async fn remove_all(&self) -> Result<usize, DownloadError> {
        let _commands = self.commands.lock().await;
        let records = self.index.list_all().await.map_err(|e| index_error(&e))?;

        let mut removed = 0;
        for record in &records {
            self.remove_locked(&record.id).await?;
            removed += 1;
        }
        self.queue_notify.notify_one();
        Ok(removed)
    }

    async fn query_state(&self, id: &str) -> Result<JobState, DownloadError> {
        Ok(self.load(id).await?.state)
    }

    async fn query_progress(&self, id: &str) -> Result<Option<f32>, DownloadError> {
        Ok(self.load(id).await?.percent)
    }

    async fn get(&self, id: &str) -> Result<JobRecord, DownloadError> {
        self.load(id).await
    }

    async fn list(&self) -> Result<Vec<JobRecord>, DownloadError> {
        self.index.list_all().await.map_err(|e| index_error(&e))
    }

    async fn snapshot(&self) -> Result<DownloadsSnapshot, DownloadError> {
        let not_met = self.config.required.not_met(self.state.lock().await.met);
        let records = self.index.list_all().await.map_err(|e| index_error(&e))?;
        Ok(DownloadsSnapshot::from_records(&records, not_met))
    }

    async fn update_met_requirements(&self, met: Requirements) -> Result<(), DownloadError> {
        let _commands = self.commands.lock().await;
        let mut state = self.state.lock().await;
        state.met = met;
        let not_met = self.config.required.not_met(met);

        if not_met.is_empty() {
            let records = self.index.list_all().await.map_err(|e| index_error(&e))?;
            let blocked = records.iter().filter(|r| {
                r.state == JobState::Stopped
                    && r.stop_reason == Some(StopReason::RequirementsNotMet)
            });
            let mut requeued = 0;
            for record in blocked {
                self.requeue_stopped(&mut state, record).await?;
                requeued += 1;
            }
            drop(state);
            if requeued > 0 {
                tracing::info!(requeued, "Requirements met, downloads re-queued");
            }
            self.queue_notify.notify_one();
            return Ok(());
        }

        let ids: Vec<String> = state.active.keys().cloned().collect();
        let mut stopped = Vec::with_capacity(ids.len());
        let mut first_error = None;
        for id in ids {
            let record = match self.load(&id).await {
                Ok(record) if record.state == JobState::Downloading => record,
                Ok(_) => continue,
                Err(e) => {
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            match self
                .persist_transition(&record, JobState::Stopped, |r| {
                    r.stop_reason = Some(StopReason::RequirementsNotMet);
                })
                .await
            {
                Ok(updated) => {
                    if let Some(job) = state.active.remove(&id) {
                        stopped.push((updated, job));
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        drop(state);

        for (updated, job) in stopped {
            self.stop_worker(&updated.id, job).await;
            self.publish_changed(&updated, Some(JobState::Downloading));
        }
        tracing::info!(not_met = ?not_met.describe(), "Requirements not met, downloads held");
        first_error.map_or(Ok(()), Err)
    }
}
