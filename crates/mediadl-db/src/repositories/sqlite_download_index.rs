//! `SQLite` implementation of the `DownloadIndexPort` trait.

use async_trait::async_trait;
use sqlx::SqlitePool;

use mediadl_core::{DownloadIndexPort, JobRecord, RepositoryError};

use super::row_mappers::{INDEX_SELECT_COLUMNS, row_to_job_record, to_db_int};

/// `SQLite` implementation of the `DownloadIndexPort` trait.
///
/// Each `put` is a single upsert statement, so a record is never observed
/// half-written. Insertion order is the table's rowid, which an upsert keeps.
pub struct SqliteDownloadIndex {
    pool: SqlitePool,
}

impl SqliteDownloadIndex {
    /// Create a new `SQLite` download index.
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadIndexPort for SqliteDownloadIndex {
    async fn put(&self, record: &JobRecord) -> Result<(), RepositoryError> {
        let content_length = record
            .content_length
            .map(|len| to_db_int(len, "content_length"))
            .transpose()?;

        sqlx::query(
            r"
            INSERT INTO download_index (
                id, resource_uri, cache_key, state, percent, bytes_downloaded,
                content_length, stop_reason, failure_reason, failure_message,
                opaque_data, retry_count, queue_seq, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                resource_uri = excluded.resource_uri,
                cache_key = excluded.cache_key,
                state = excluded.state,
                percent = excluded.percent,
                bytes_downloaded = excluded.bytes_downloaded,
                content_length = excluded.content_length,
                stop_reason = excluded.stop_reason,
                failure_reason = excluded.failure_reason,
                failure_message = excluded.failure_message,
                opaque_data = excluded.opaque_data,
                retry_count = excluded.retry_count,
                queue_seq = excluded.queue_seq,
                updated_at = excluded.updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.resource_uri)
        .bind(record.cache_key.as_str())
        .bind(record.state.as_str())
        .bind(record.percent.map(f64::from))
        .bind(to_db_int(record.bytes_downloaded, "bytes_downloaded")?)
        .bind(content_length)
        .bind(record.stop_reason.map(|r| r.as_str()))
        .bind(record.failure_reason.map(|r| r.as_str()))
        .bind(&record.failure_message)
        .bind(&record.opaque_data)
        .bind(i64::from(record.retry_count))
        .bind(to_db_int(record.queue_seq, "queue_seq")?)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {INDEX_SELECT_COLUMNS} FROM download_index WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        row.as_ref().map(row_to_job_record).transpose()
    }

    async fn remove(&self, id: &str) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM download_index WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Download with ID '{id}'")));
        }

        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<JobRecord>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {INDEX_SELECT_COLUMNS} FROM download_index ORDER BY rowid ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        rows.iter().map(row_to_job_record).collect()
    }
}
