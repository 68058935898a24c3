//! Wiring of the engine: cache, bus, listeners and orchestrator.

use std::sync::Arc;

use mediadl_core::{
    ByteRange, ByteStream, DownloadError, DownloadIndexPort, DownloadOrchestratorPort,
    EngineConfig, JobListener, ResourceFetcherPort, SignalLedgerPort, SignalSinkPort,
};

use crate::bus::{DownloadStateMirror, ListenerBus, SubscriptionId, TerminalStateNotifier};
use crate::cache::ContentCache;
use crate::manager::{DownloadOrchestrator, RestoreSummary};

/// External collaborators the engine needs.
pub struct OrchestratorDeps {
    pub index: Arc<dyn DownloadIndexPort>,
    pub fetcher: Arc<dyn ResourceFetcherPort>,
    pub signal_sink: Option<Arc<dyn SignalSinkPort>>,
    pub signal_ledger: Option<Arc<dyn SignalLedgerPort>>,
    /// Extra listeners subscribed before the restore replay.
    pub listeners: Vec<Arc<dyn JobListener>>,
}

impl OrchestratorDeps {
    pub fn new(index: Arc<dyn DownloadIndexPort>, fetcher: Arc<dyn ResourceFetcherPort>) -> Self {
        Self {
            index,
            fetcher,
            signal_sink: None,
            signal_ledger: None,
            listeners: Vec::new(),
        }
    }

    /// Raise terminal-state signals through `sink`, deduplicated via `ledger`.
    #[must_use]
    pub fn with_signals(
        mut self,
        sink: Arc<dyn SignalSinkPort>,
        ledger: Option<Arc<dyn SignalLedgerPort>>,
    ) -> Self {
        self.signal_sink = Some(sink);
        self.signal_ledger = ledger;
        self
    }

    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn JobListener>) -> Self {
        self.listeners.push(listener);
        self
    }
}

/// A running engine instance.
///
/// `open` restores state from the index but does not start transfers;
/// call [`Self::start`] once the caller is ready.
pub struct OrchestratorContext {
    orchestrator: Arc<DownloadOrchestrator>,
    fetcher: Arc<dyn ResourceFetcherPort>,
    bus: Arc<ListenerBus>,
    mirror: Arc<DownloadStateMirror>,
    cache: ContentCache,
    restored: RestoreSummary,
}

impl OrchestratorContext {
    pub async fn open(config: EngineConfig, deps: OrchestratorDeps) -> Result<Self, DownloadError> {
        let cache = ContentCache::open(
            config.cache_dir(),
            config.cache_budget_bytes,
            config.chunk_size,
        )
        .await?;

        let bus = Arc::new(ListenerBus::new());
        let mirror = Arc::new(DownloadStateMirror::new());
        bus.subscribe(mirror.clone());
        if let Some(sink) = deps.signal_sink {
            bus.subscribe(Arc::new(TerminalStateNotifier::new(
                sink,
                deps.signal_ledger,
                config.first_notification_id,
            )));
        }
        for listener in deps.listeners {
            bus.subscribe(listener);
        }

        let orchestrator = Arc::new(DownloadOrchestrator::new(
            config,
            deps.index,
            Arc::clone(&deps.fetcher),
            cache.clone(),
            Arc::clone(&bus),
        ));
        let restored = orchestrator.restore().await?;

        Ok(Self {
            orchestrator,
            fetcher: deps.fetcher,
            bus,
            mirror,
            cache,
            restored,
        })
    }

    /// Start scheduling transfers.
    pub fn start(&self) {
        self.orchestrator.ensure_runner();
    }

    /// The command surface.
    pub fn orchestrator(&self) -> Arc<dyn DownloadOrchestratorPort> {
        self.orchestrator.clone()
    }

    /// The concrete orchestrator, for engine-level calls.
    pub const fn engine(&self) -> &Arc<DownloadOrchestrator> {
        &self.orchestrator
    }

    pub const fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub const fn mirror(&self) -> &Arc<DownloadStateMirror> {
        &self.mirror
    }

    pub const fn restored(&self) -> RestoreSummary {
        self.restored
    }

    /// Subscribe a listener. It sees only events published from now on.
    pub fn subscribe(&self, listener: Arc<dyn JobListener>) -> SubscriptionId {
        self.bus.subscribe(listener)
    }

    /// Stream a byte range of a job's resource through the cache.
    ///
    /// Cached spans are served locally and gaps are fetched and cached.
    pub async fn read_resource(
        &self,
        id: &str,
        range: ByteRange,
    ) -> Result<ByteStream, DownloadError> {
        let record = self.orchestrator.get(id).await?;
        Ok(self.cache.open_for_read(
            &record.cache_key,
            &record.resource_uri,
            range,
            Arc::clone(&self.fetcher),
        ))
    }

    /// Stop transfers and drain listeners.
    pub async fn shutdown(&self) {
        self.orchestrator.shutdown().await;
        self.bus.shutdown().await;
    }
}
