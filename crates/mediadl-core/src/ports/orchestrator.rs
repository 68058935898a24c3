//! Orchestrator command port.
//!
//! The presentation layer talks to the engine only through this trait.

use async_trait::async_trait;

use crate::job::{DownloadError, DownloadRequest, DownloadsSnapshot, JobRecord, JobState};
use crate::requirements::Requirements;

/// Port for issuing commands to the download engine.
///
/// # Usage
///
/// ```ignore
/// let engine: Arc<dyn DownloadOrchestratorPort> = context.orchestrator();
/// engine.add_download(DownloadRequest::new("ep-1", uri).with_data("Episode 1")).await?;
/// engine.pause_download("ep-1").await?;
/// ```
#[async_trait]
pub trait DownloadOrchestratorPort: Send + Sync {
    /// Queue a download. Returns the existing record unchanged if the id exists.
    async fn add_download(&self, request: DownloadRequest) -> Result<JobRecord, DownloadError>;

    /// Pause a DOWNLOADING job.
    async fn pause_download(&self, id: &str) -> Result<JobRecord, DownloadError>;

    /// Resume a STOPPED job.
    async fn resume_download(&self, id: &str) -> Result<JobRecord, DownloadError>;

    /// Resume every STOPPED job. Returns the number resumed.
    async fn resume_all(&self) -> Result<usize, DownloadError>;

    /// Remove a job, its record, and its exclusive cache bytes.
    async fn remove_download(&self, id: &str) -> Result<(), DownloadError>;

    /// Remove every job. Returns the number removed.
    async fn remove_all(&self) -> Result<usize, DownloadError>;

    /// Current state of a job.
    async fn query_state(&self, id: &str) -> Result<JobState, DownloadError>;

    /// Current completion of a job, `None` while the length is unknown.
    async fn query_progress(&self, id: &str) -> Result<Option<f32>, DownloadError>;

    /// Full record of a job.
    async fn get(&self, id: &str) -> Result<JobRecord, DownloadError>;

    /// Every record in index order.
    async fn list(&self) -> Result<Vec<JobRecord>, DownloadError>;

    /// Summary for a foreground progress indicator.
    async fn snapshot(&self) -> Result<DownloadsSnapshot, DownloadError>;

    /// Report which requirements currently hold.
    async fn update_met_requirements(&self, met: Requirements) -> Result<(), DownloadError>;
}
