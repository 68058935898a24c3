//! `SQLite` implementation of the `SignalLedgerPort` trait.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use mediadl_core::{RepositoryError, SignalKind, SignalLedgerPort, TerminalSignal};

use super::row_mappers::{from_db_int, map_column_error, to_db_int};

/// Records raised terminal signals keyed by `(job_id, kind)`.
pub struct SqliteSignalLedger {
    pool: SqlitePool,
}

impl SqliteSignalLedger {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalLedgerPort for SqliteSignalLedger {
    async fn was_signalled(
        &self,
        job_id: &str,
        kind: SignalKind,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query("SELECT 1 FROM terminal_signals WHERE job_id = ? AND kind = ?")
            .bind(job_id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn record(&self, signal: &TerminalSignal) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO terminal_signals (job_id, kind, notification_id, raised_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(job_id, kind) DO UPDATE SET
                notification_id = excluded.notification_id,
                raised_at = excluded.raised_at
            ",
        )
        .bind(&signal.job_id)
        .bind(signal.kind.as_str())
        .bind(to_db_int(signal.notification_id, "notification_id")?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn forget(&self, job_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM terminal_signals WHERE job_id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn max_notification_id(&self) -> Result<Option<u64>, RepositoryError> {
        let row = sqlx::query("SELECT MAX(notification_id) AS max_id FROM terminal_signals")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?;

        let max_id: Option<i64> = row.try_get("max_id").map_err(map_column_error)?;
        max_id.map(|id| from_db_int(id, "notification_id")).transpose()
    }
}
