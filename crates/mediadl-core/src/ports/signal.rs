//! Terminal-state signal ports.
//!
//! The sink is the OS-level notification collaborator; the ledger records
//! which signals were raised so redelivered events never raise twice.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::RepositoryError;

/// Kind of terminal signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Completed,
    Failed,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-visible signal for a job that reached a terminal state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSignal {
    /// Id for the OS notification, unique per raised signal.
    pub notification_id: u64,
    pub job_id: String,
    pub kind: SignalKind,
    /// The job's opaque data, typically the display title.
    pub opaque_data: Vec<u8>,
}

impl TerminalSignal {
    /// The opaque data as text.
    #[must_use]
    pub fn title(&self) -> String {
        String::from_utf8_lossy(&self.opaque_data).into_owned()
    }
}

/// Port for the OS-level notification collaborator.
#[async_trait]
pub trait SignalSinkPort: Send + Sync {
    /// Show the signal to the user.
    async fn raise_signal(&self, signal: &TerminalSignal) -> Result<(), String>;
}

/// Port for durable signal bookkeeping.
#[async_trait]
pub trait SignalLedgerPort: Send + Sync {
    /// Whether a signal was already raised for `(job_id, kind)`.
    async fn was_signalled(&self, job_id: &str, kind: SignalKind)
    -> Result<bool, RepositoryError>;

    /// Record a raised signal.
    async fn record(&self, signal: &TerminalSignal) -> Result<(), RepositoryError>;

    /// Forget every signal for `job_id` (the id may be reused).
    async fn forget(&self, job_id: &str) -> Result<(), RepositoryError>;

    /// Highest notification id recorded so far.
    async fn max_notification_id(&self) -> Result<Option<u64>, RepositoryError>;
}
