//! Composition utilities for building `SQLite`-backed stores.
//!
//! Construction only; no domain logic.

use sqlx::SqlitePool;
use std::sync::Arc;

use mediadl_core::{DownloadIndexPort, SignalLedgerPort};

use crate::repositories::{SqliteDownloadIndex, SqliteSignalLedger};

/// The durable stores the engine needs, as trait objects.
#[derive(Clone)]
pub struct Stores {
    pub index: Arc<dyn DownloadIndexPort>,
    pub ledger: Arc<dyn SignalLedgerPort>,
}

/// Factory for creating repository instances with `SQLite` backends.
pub struct DbFactory;

impl DbFactory {
    /// Build all stores from a pool returned by `setup_database()`.
    pub fn build_stores(pool: &SqlitePool) -> Stores {
        Stores {
            index: Arc::new(SqliteDownloadIndex::new(pool.clone())),
            ledger: Arc::new(SqliteSignalLedger::new(pool.clone())),
        }
    }
}
