//! Download index port definition.
//!
//! The index is the durable mapping from job id to [`JobRecord`] and the
//! single source of truth for job state.

use async_trait::async_trait;

use super::RepositoryError;
use crate::job::JobRecord;

/// Port for the durable job index.
///
/// # Contract
///
/// - `put` replaces the whole record atomically; a successful return
///   survives a crash immediately after.
/// - Reads never block on in-flight writes to a different record.
/// - `list_all` returns records in insertion order.
#[async_trait]
pub trait DownloadIndexPort: Send + Sync {
    /// Insert or replace a record.
    async fn put(&self, record: &JobRecord) -> Result<(), RepositoryError>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<JobRecord>, RepositoryError>;

    /// Delete a record. Returns `NotFound` if no record has this id.
    async fn remove(&self, id: &str) -> Result<(), RepositoryError>;

    /// All records, oldest first.
    async fn list_all(&self) -> Result<Vec<JobRecord>, RepositoryError>;
}
