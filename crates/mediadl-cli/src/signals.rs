//! Console stand-in for the OS notification collaborator.

use async_trait::async_trait;
use mediadl_core::{SignalKind, SignalSinkPort, TerminalSignal};

/// Prints terminal-state signals to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSignalSink;

impl ConsoleSignalSink {
    pub const fn new() -> Self {
        Self
    }
}

/// The line shown for a signal.
pub fn signal_message(signal: &TerminalSignal) -> String {
    let title = signal.title();
    let label = if title.trim().is_empty() {
        signal.job_id.as_str()
    } else {
        title.as_str()
    };
    match signal.kind {
        SignalKind::Completed => format!("✅ Download complete: {label}"),
        SignalKind::Failed => format!("❌ Download failed: {label}"),
    }
}

#[async_trait]
impl SignalSinkPort for ConsoleSignalSink {
    async fn raise_signal(&self, signal: &TerminalSignal) -> Result<(), String> {
        println!("{}", signal_message(signal));
        tracing::debug!(
            id = %signal.job_id,
            kind = %signal.kind,
            notification_id = signal.notification_id,
            "Signal shown"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(kind: SignalKind, title: &str) -> TerminalSignal {
        TerminalSignal {
            notification_id: 2,
            job_id: "ep-1".to_string(),
            kind,
            opaque_data: title.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_message_uses_title() {
        assert_eq!(
            signal_message(&signal(SignalKind::Completed, "Sintel")),
            "✅ Download complete: Sintel"
        );
    }

    #[test]
    fn test_message_falls_back_to_id() {
        assert_eq!(
            signal_message(&signal(SignalKind::Failed, "")),
            "❌ Download failed: ep-1"
        );
    }
}
