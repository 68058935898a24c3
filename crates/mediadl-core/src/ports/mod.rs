//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the engine expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No `sqlx` or `reqwest` types in any signature
//! - Repositories are whole-record and CRUD-focused
//! - Listener and signal ports are fire-and-forget from the engine's view

pub mod download_index;
pub mod fetcher;
pub mod listener;
pub mod orchestrator;
pub mod signal;

use thiserror::Error;

pub use download_index::DownloadIndexPort;
pub use fetcher::{ByteRange, ByteStream, FetchedResource, ResourceFetcherPort};
pub use listener::{JobListener, ListenerError};
pub use orchestrator::DownloadOrchestratorPort;
pub use signal::{SignalKind, SignalLedgerPort, SignalSinkPort, TerminalSignal};

/// Domain-specific errors for repository operations.
///
/// This error type abstracts away storage implementation details (e.g., sqlx errors)
/// and provides a clean interface for the engine to handle storage failures.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The requested entity was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An entity with the same identifier already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage backend error (database, filesystem, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<RepositoryError> for crate::job::DownloadError {
    fn from(err: RepositoryError) -> Self {
        Self::index_write(err.to_string())
    }
}
