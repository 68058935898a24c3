//! Download error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{FailureReason, JobState};

/// Error type for engine operations.
///
/// Worker-level variants (`Network`, `Interrupted`, `CacheFull`, `Io`) are
/// translated into job-level retry or FAILED decisions by the orchestrator.
/// Command-level variants (`NotFound`, `IndexWrite`, `InvalidTransition`) are
/// returned to the caller and imply the job's state is unchanged.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadError {
    /// I/O error during cache file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "not found", "permission denied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// Transient network/transport fault (timeout, reset, 5xx).
    #[error("Network error: {message}")]
    Network {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// The transfer stopped early and can be resumed from the cached spans.
    #[error("Transfer interrupted at {bytes_downloaded} bytes")]
    Interrupted {
        /// Bytes present before interruption.
        bytes_downloaded: u64,
    },

    /// The cache could not make room for a write because every span is pinned.
    #[error("Cache full: need {requested} bytes, budget {budget} bytes")]
    CacheFull {
        /// Bytes the write needed.
        requested: u64,
        /// Configured cache budget.
        budget: u64,
    },

    /// The durable index rejected a write; the job's state is unchanged.
    #[error("Index write failed: {message}")]
    IndexWrite {
        /// Detailed error message.
        message: String,
    },

    /// No job with this id exists.
    #[error("Not found: {id}")]
    NotFound {
        /// The unknown job id.
        id: String,
    },

    /// The command does not apply to the job's current state.
    #[error("Invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// The job id.
        id: String,
        /// Current state.
        from: JobState,
        /// Requested state.
        to: JobState,
    },

    /// The upstream returned bytes that do not match the requested range.
    #[error("Invalid range: {message}")]
    InvalidRange {
        /// Detailed error message.
        message: String,
    },

    /// The transfer was cancelled (pause, remove, shutdown).
    #[error("Download cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl DownloadError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create a network error with HTTP status code.
    pub fn network_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Network {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a cache full error.
    #[must_use]
    pub const fn cache_full(requested: u64, budget: u64) -> Self {
        Self::CacheFull { requested, budget }
    }

    /// Create an index write error.
    pub fn index_write(message: impl Into<String>) -> Self {
        Self::IndexWrite {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid transition error.
    pub fn invalid_transition(id: impl Into<String>, from: JobState, to: JobState) -> Self {
        Self::InvalidTransition {
            id: id.into(),
            from,
            to,
        }
    }

    /// Create an invalid range error.
    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable at the job level (worth a re-queue).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::Interrupted { .. } | Self::Io { .. }
        )
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The failure reason recorded when this error ends a job.
    #[must_use]
    pub const fn failure_reason(&self) -> FailureReason {
        match self {
            Self::CacheFull { .. } => FailureReason::CacheFull,
            Self::Network { .. } | Self::Interrupted { .. } | Self::Io { .. } => {
                FailureReason::TransientTransfer
            }
            _ => FailureReason::Unrecoverable,
        }
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { message, .. } => format!("Cache file operation failed: {message}"),
            Self::Network {
                message,
                status_code: Some(code),
            } => {
                format!("Network error (HTTP {code}): {message}")
            }
            Self::Network { message, .. } => format!("Network error: {message}"),
            Self::Interrupted { bytes_downloaded } => {
                format!("Download interrupted after {bytes_downloaded} bytes. It will resume.")
            }
            Self::CacheFull { requested, budget } => format!(
                "Not enough cache space: {requested} bytes needed but the {budget} byte budget is in use."
            ),
            Self::IndexWrite { message } => {
                format!("Could not save download state ({message}). Nothing was changed.")
            }
            Self::NotFound { id } => format!("Download '{id}' does not exist."),
            Self::InvalidTransition { id, from, to } => {
                format!("Download '{id}' is {from} and cannot become {to}.")
            }
            Self::InvalidRange { message } => format!("Server returned an invalid range: {message}"),
            Self::Cancelled => "Download was cancelled.".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

impl From<std::io::Error> for DownloadError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io_error(&err)
    }
}

/// Convenience result type for download operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
