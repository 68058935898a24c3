//! Database setup and initialization.
//!
//! Entry points call `setup_database()` with the resolved database path.

use anyhow::Result;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;

/// Sets up the `SQLite` database connection and ensures the schema exists.
///
/// The connection uses WAL journaling with `synchronous = FULL`, so a write
/// that returns success survives a crash immediately after.
///
/// # Example
///
/// ```rust,no_run
/// use mediadl_db::setup_database;
/// use std::path::Path;
///
/// # async fn example() -> anyhow::Result<()> {
/// let pool = setup_database(Path::new("/path/to/mediadl.db")).await?;
/// # Ok(())
/// # }
/// ```
pub async fn setup_database(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePool::connect_with(options).await?;
    create_schema(&pool).await?;

    tracing::debug!(path = %db_path.display(), "Index database ready");
    Ok(pool)
}

/// Sets up an in-memory `SQLite` database for testing.
///
/// A single connection is kept so every query sees the same memory database.
#[cfg(any(test, feature = "test-utils"))]
pub async fn setup_test_database() -> Result<SqlitePool> {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;
    create_schema(&pool).await?;
    Ok(pool)
}

/// Creates the complete database schema.
///
/// Safe to call multiple times as all operations use IF NOT EXISTS.
async fn create_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS download_index (
            id TEXT PRIMARY KEY NOT NULL,
            resource_uri TEXT NOT NULL,
            cache_key TEXT NOT NULL,
            state TEXT NOT NULL,
            percent REAL,
            bytes_downloaded INTEGER NOT NULL DEFAULT 0,
            content_length INTEGER,
            stop_reason TEXT,
            failure_reason TEXT,
            failure_message TEXT,
            opaque_data BLOB NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            queue_seq INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_download_index_state ON download_index(state)")
        .execute(pool)
        .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS terminal_signals (
            job_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('completed', 'failed')),
            notification_id INTEGER NOT NULL,
            raised_at TEXT NOT NULL,
            PRIMARY KEY (job_id, kind)
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_setup_test_database() {
        let pool = setup_test_database().await.unwrap();

        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM download_index")
            .fetch_one(&pool)
            .await
            .unwrap();

        let _: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM terminal_signals")
            .fetch_one(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_setup_database_on_disk_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("mediadl.db");

        let pool = setup_database(&path).await.unwrap();
        pool.close().await;
        let pool = setup_database(&path).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
