//! `SQLite` adapters for the mediadl engine.
//!
//! Implements the durable Download Index and the terminal-signal ledger on
//! top of `sqlx`. The pool never leaks through the port traits.

#![deny(unsafe_code)]

pub mod factory;
pub mod repositories;
pub mod setup;

pub use factory::{DbFactory, Stores};

pub use repositories::{SqliteDownloadIndex, SqliteSignalLedger};

pub use setup::setup_database;
#[cfg(any(test, feature = "test-utils"))]
pub use setup::setup_test_database;
