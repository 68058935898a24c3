//! Row mapping helpers for `SQLite` queries.

use chrono::{DateTime, Utc};
use mediadl_core::{CacheKey, FailureReason, JobRecord, JobState, RepositoryError, StopReason};
use sqlx::Row;

/// Shared SELECT column list for index queries.
pub const INDEX_SELECT_COLUMNS: &str = "id, resource_uri, cache_key, state, percent, bytes_downloaded, content_length, stop_reason, failure_reason, failure_message, opaque_data, retry_count, queue_seq, created_at, updated_at";

pub fn map_column_error(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(format!("Column read error: {e}"))
}

/// Store an unsigned counter in an `INTEGER` column.
pub fn to_db_int(value: u64, column: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("{column} out of range: {value}")))
}

/// Read an unsigned counter back from an `INTEGER` column.
pub fn from_db_int(value: i64, column: &str) -> Result<u64, RepositoryError> {
    u64::try_from(value)
        .map_err(|_| RepositoryError::Serialization(format!("{column} is negative: {value}")))
}

/// Parse a database row into a `JobRecord`.
pub fn row_to_job_record(row: &sqlx::sqlite::SqliteRow) -> Result<JobRecord, RepositoryError> {
    let state_str: String = row.try_get("state").map_err(map_column_error)?;
    let state = JobState::parse(&state_str)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown state '{state_str}'")))?;

    let stop_reason: Option<String> = row.try_get("stop_reason").map_err(map_column_error)?;
    let failure_reason: Option<String> = row.try_get("failure_reason").map_err(map_column_error)?;
    let percent: Option<f64> = row.try_get("percent").map_err(map_column_error)?;
    let bytes_downloaded: i64 = row.try_get("bytes_downloaded").map_err(map_column_error)?;
    let content_length: Option<i64> = row.try_get("content_length").map_err(map_column_error)?;
    let retry_count: i64 = row.try_get("retry_count").map_err(map_column_error)?;
    let queue_seq: i64 = row.try_get("queue_seq").map_err(map_column_error)?;
    let cache_key: String = row.try_get("cache_key").map_err(map_column_error)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(map_column_error)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(map_column_error)?;

    #[allow(clippy::cast_possible_truncation)]
    let percent = percent.map(|p| p as f32);

    Ok(JobRecord {
        id: row.try_get("id").map_err(map_column_error)?,
        resource_uri: row.try_get("resource_uri").map_err(map_column_error)?,
        cache_key: CacheKey::new(cache_key),
        state,
        percent,
        bytes_downloaded: from_db_int(bytes_downloaded, "bytes_downloaded")?,
        content_length: content_length
            .map(|len| from_db_int(len, "content_length"))
            .transpose()?,
        stop_reason: stop_reason.as_deref().and_then(StopReason::parse),
        failure_reason: failure_reason.as_deref().and_then(FailureReason::parse),
        failure_message: row.try_get("failure_message").map_err(map_column_error)?,
        opaque_data: row.try_get("opaque_data").map_err(map_column_error)?,
        retry_count: u32::try_from(retry_count).map_err(|_| {
            RepositoryError::Serialization(format!("retry_count out of range: {retry_count}"))
        })?,
        queue_seq: from_db_int(queue_seq, "queue_seq")?,
        created_at,
        updated_at,
    })
}
