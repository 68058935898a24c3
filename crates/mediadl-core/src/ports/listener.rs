//! Listener port for bus subscribers.

use async_trait::async_trait;
use thiserror::Error;

use crate::job::DeliveredEvent;

/// Error returned by a listener. Logged by the bus, never propagated.
#[derive(Debug, Error)]
#[error("listener {listener} failed: {message}")]
pub struct ListenerError {
    pub listener: String,
    pub message: String,
}

impl ListenerError {
    pub fn new(listener: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            listener: listener.into(),
            message: message.into(),
        }
    }
}

/// A subscriber to job events.
///
/// Each listener receives events in publish order on its own delivery task,
/// so a slow listener delays only itself.
#[async_trait]
pub trait JobListener: Send + Sync {
    /// Short name for log lines.
    fn name(&self) -> &str;

    /// Handle one delivered event.
    async fn on_event(&self, event: &DeliveredEvent) -> Result<(), ListenerError>;
}
