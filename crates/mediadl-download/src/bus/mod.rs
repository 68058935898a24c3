//! Ordered event delivery to job listeners.
//!
//! Every published event gets a sequence number assigned under the bus lock,
//! so all listeners observe the same global order. Each listener has its own
//! delivery task fed by an unbounded channel: a slow listener delays only
//! itself, and a failing or panicking listener is logged and skipped.

mod mirror;
mod notifier;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use mediadl_core::{DeliveredEvent, JobEvent, JobListener};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use mirror::{DownloadStateMirror, MirrorEntry, MirrorSnapshot};
pub use notifier::TerminalStateNotifier;

/// Handle returned by [`ListenerBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    name: String,
    tx: mpsc::UnboundedSender<DeliveredEvent>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct BusState {
    next_seq: u64,
    next_subscription: u64,
    subscribers: Vec<Subscriber>,
}

/// Fan-out of job events to registered listeners.
#[derive(Default)]
pub struct ListenerBus {
    state: Mutex<BusState>,
}

impl ListenerBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener. It receives every event published afterwards.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe(&self, listener: Arc<dyn JobListener>) -> SubscriptionId {
        let (tx, rx) = mpsc::unbounded_channel();
        let name = listener.name().to_string();
        let handle = tokio::spawn(deliver(listener, rx));

        let mut state = self.lock();
        state.next_subscription += 1;
        let id = SubscriptionId(state.next_subscription);
        tracing::debug!(listener = %name, "Listener subscribed");
        state.subscribers.push(Subscriber {
            id,
            name,
            tx,
            handle,
        });
        id
    }

    /// Remove a listener. Events already queued for it are still delivered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        before != state.subscribers.len()
    }

    /// Publish an event to every listener. Returns its sequence number.
    pub fn publish(&self, event: JobEvent) -> u64 {
        let mut state = self.lock();
        state.next_seq += 1;
        let delivered = DeliveredEvent {
            seq: state.next_seq,
            event,
        };
        state.subscribers.retain(|s| {
            if s.tx.send(delivered.clone()).is_ok() {
                true
            } else {
                tracing::warn!(listener = %s.name, "Listener delivery task gone, dropping it");
                false
            }
        });
        delivered.seq
    }

    /// Sequence number of the most recent event.
    pub fn last_seq(&self) -> u64 {
        self.lock().next_seq
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    /// Drop all listeners after they drain their queued events.
    pub async fn shutdown(&self) {
        let subscribers = std::mem::take(&mut self.lock().subscribers);
        for subscriber in subscribers {
            drop(subscriber.tx);
            if let Err(e) = subscriber.handle.await {
                tracing::warn!(listener = %subscriber.name, error = %e, "Listener task ended abnormally");
            }
        }
    }
}

async fn deliver(listener: Arc<dyn JobListener>, mut rx: mpsc::UnboundedReceiver<DeliveredEvent>) {
    while let Some(event) = rx.recv().await {
        match AssertUnwindSafe(listener.on_event(&event))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(
                    listener = listener.name(),
                    seq = event.seq,
                    error = %e,
                    "Listener failed to handle event"
                );
            }
            Err(_) => {
                tracing::warn!(
                    listener = listener.name(),
                    seq = event.seq,
                    "Listener panicked while handling event"
                );
            }
        }
    }
}
