//! Repository implementations using `SQLite`.
//!
//! These implementations encapsulate all SQL queries and database access.
//! The `SqlitePool` is confined to this module and never exposed through
//! the port trait signatures.

mod row_mappers;
mod sqlite_download_index;
mod sqlite_signal_ledger;

pub use sqlite_download_index::SqliteDownloadIndex;
pub use sqlite_signal_ledger::SqliteSignalLedger;
