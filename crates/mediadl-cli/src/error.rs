//! CLI error type and exit codes.

use mediadl_core::DownloadError;
use thiserror::Error;

/// CLI-specific error type.
#[derive(Debug, Clone, Error)]
pub enum CliError {
    /// Engine error not covered below.
    #[error("{0}")]
    Engine(String),

    /// The command named something that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The command does not apply to the download's current state.
    #[error("{0}")]
    InvalidState(String),

    /// IO error (export destination, data directory).
    #[error("IO error: {0}")]
    Io(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The index database rejected a write.
    #[error("Database error: {0}")]
    Database(String),
}

impl CliError {
    /// Map error to an exit code (sysexits.h where one fits).
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Engine(_) => 1,
            Self::InvalidState(_) => 65, // EX_DATAERR
            Self::NotFound(_) => 66,     // EX_NOINPUT
            Self::Database(_) => 73,     // EX_CANTCREAT
            Self::Io(_) => 74,           // EX_IOERR
            Self::Config(_) => 78,       // EX_CONFIG
        }
    }

    /// Classify an error bubbled up to `main`.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        if let Some(cli) = err.downcast_ref::<Self>() {
            return cli.clone();
        }
        if let Some(download) = err.downcast_ref::<DownloadError>() {
            return download.clone().into();
        }
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return Self::Io(io.to_string());
        }
        Self::Engine(format!("{err:#}"))
    }
}

impl From<DownloadError> for CliError {
    fn from(err: DownloadError) -> Self {
        let message = err.user_message();
        match err {
            DownloadError::NotFound { .. } => Self::NotFound(message),
            DownloadError::InvalidTransition { .. } => Self::InvalidState(message),
            DownloadError::IndexWrite { .. } => Self::Database(message),
            DownloadError::Io { .. } => Self::Io(message),
            _ => Self::Engine(message),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediadl_core::JobState;

    #[test]
    fn test_download_errors_map_to_exit_codes() {
        let not_found: CliError = DownloadError::not_found("ep-1").into();
        assert_eq!(not_found.exit_code(), 66);

        let invalid: CliError =
            DownloadError::invalid_transition("ep-1", JobState::Completed, JobState::Queued).into();
        assert_eq!(invalid.exit_code(), 65);

        let network: CliError = DownloadError::network("reset").into();
        assert_eq!(network.exit_code(), 1);
    }

    #[test]
    fn test_from_anyhow_finds_download_error() {
        let err = anyhow::Error::new(DownloadError::not_found("x"));
        assert!(matches!(CliError::from_anyhow(&err), CliError::NotFound(_)));

        let err = anyhow::Error::new(CliError::Config("bad".into()));
        assert_eq!(CliError::from_anyhow(&err).exit_code(), 78);

        let err = anyhow::anyhow!("something else");
        assert_eq!(CliError::from_anyhow(&err).exit_code(), 1);
    }
}
