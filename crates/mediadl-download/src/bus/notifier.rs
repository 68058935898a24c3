//! Terminal-state signals (completion / failure notifications).

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use mediadl_core::{
    DeliveredEvent, JobChanged, JobEvent, JobListener, JobState, ListenerError, SignalKind,
    SignalLedgerPort, SignalSinkPort, TerminalSignal,
};
use tokio::sync::Mutex;

const NAME: &str = "terminal-notifier";

#[derive(Default)]
struct NotifierState {
    raised: HashSet<(String, SignalKind)>,
    next_id: Option<u64>,
}

/// Raises one signal per job per terminal state.
///
/// With a ledger, signals survive restarts: a replayed COMPLETED event for a
/// job that was already signalled raises nothing. Without one, replayed
/// events are ignored outright.
pub struct TerminalStateNotifier {
    sink: Arc<dyn SignalSinkPort>,
    ledger: Option<Arc<dyn SignalLedgerPort>>,
    first_id: u64,
    state: Mutex<NotifierState>,
}

impl TerminalStateNotifier {
    pub fn new(
        sink: Arc<dyn SignalSinkPort>,
        ledger: Option<Arc<dyn SignalLedgerPort>>,
        first_id: u64,
    ) -> Self {
        Self {
            sink,
            ledger,
            first_id,
            state: Mutex::new(NotifierState::default()),
        }
    }

    const fn kind_for(state: JobState) -> Option<SignalKind> {
        match state {
            JobState::Completed => Some(SignalKind::Completed),
            JobState::Failed => Some(SignalKind::Failed),
            _ => None,
        }
    }

    async fn allocate_id(&self, state: &mut NotifierState) -> Result<u64, ListenerError> {
        let next = match state.next_id {
            Some(next) => next,
            None => {
                let recorded = match &self.ledger {
                    Some(ledger) => ledger
                        .max_notification_id()
                        .await
                        .map_err(|e| ListenerError::new(NAME, e.to_string()))?,
                    None => None,
                };
                recorded.map_or(self.first_id, |max| self.first_id.max(max + 1))
            }
        };
        state.next_id = Some(next + 1);
        Ok(next)
    }

    async fn signal(&self, change: &JobChanged, kind: SignalKind) -> Result<(), ListenerError> {
        if change.replay && self.ledger.is_none() {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        let key = (change.id.clone(), kind);
        if state.raised.contains(&key) {
            return Ok(());
        }
        if let Some(ledger) = &self.ledger {
            let signalled = ledger
                .was_signalled(&change.id, kind)
                .await
                .map_err(|e| ListenerError::new(NAME, e.to_string()))?;
            if signalled {
                state.raised.insert(key);
                return Ok(());
            }
        }

        let signal = TerminalSignal {
            notification_id: self.allocate_id(&mut state).await?,
            job_id: change.id.clone(),
            kind,
            opaque_data: change.opaque_data.clone(),
        };
        self.sink
            .raise_signal(&signal)
            .await
            .map_err(|e| ListenerError::new(NAME, e))?;
        state.raised.insert(key);

        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(&signal).await {
                tracing::warn!(job_id = %signal.job_id, error = %e, "Could not record raised signal");
            }
        }
        tracing::info!(
            job_id = %signal.job_id,
            kind = %kind,
            notification_id = signal.notification_id,
            "Terminal signal raised"
        );
        Ok(())
    }

    async fn forget(&self, id: &str) -> Result<(), ListenerError> {
        self.state.lock().await.raised.retain(|(job, _)| job != id);
        if let Some(ledger) = &self.ledger {
            ledger
                .forget(id)
                .await
                .map_err(|e| ListenerError::new(NAME, e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobListener for TerminalStateNotifier {
    fn name(&self) -> &str {
        NAME
    }

    async fn on_event(&self, event: &DeliveredEvent) -> Result<(), ListenerError> {
        match &event.event {
            JobEvent::Changed(change) => match Self::kind_for(change.state) {
                Some(kind) => self.signal(change, kind).await,
                None => Ok(()),
            },
            JobEvent::Removed { id } => self.forget(id).await,
        }
    }
}
