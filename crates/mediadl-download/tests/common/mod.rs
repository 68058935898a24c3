//! Shared fakes and harness for engine integration tests.
//!
//! Everything runs against a real `SQLite` index in a temp directory and an
//! in-memory fetcher; no network access is needed.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mediadl_core::{
    ByteRange, CacheKey, DeliveredEvent, DownloadError, DownloadIndexPort,
    DownloadOrchestratorPort, EngineConfig, FetchedResource, JobChanged, JobEvent, JobListener,
    JobRecord, JobState, ListenerError, RepositoryError, ResourceFetcherPort, SignalSinkPort,
};
use mediadl_db::{DbFactory, Stores, setup_database};
use mediadl_download::{OrchestratorContext, OrchestratorDeps};
use tempfile::TempDir;
use tokio::sync::Semaphore;

// ── Fetcher ─────────────────────────────────────────────────────────

struct Resource {
    body: Bytes,
    chunk: usize,
    report_length: bool,
    failures_left: u32,
    /// (times, after_bytes): the body breaks after `after_bytes`.
    interrupts: Option<(u32, usize)>,
    gate: Option<Arc<Semaphore>>,
}

/// In-memory upstream with scripted faults.
#[derive(Default)]
pub struct MemoryFetcher {
    resources: Mutex<HashMap<String, Resource>>,
    requests: Mutex<Vec<(String, ByteRange)>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `uri` in 10-byte chunks.
    pub fn serve(&self, uri: &str, body: impl Into<Vec<u8>>) {
        self.resources.lock().unwrap().insert(
            uri.to_string(),
            Resource {
                body: Bytes::from(body.into()),
                chunk: 10,
                report_length: true,
                failures_left: 0,
                interrupts: None,
                gate: None,
            },
        );
    }

    fn with_resource(&self, uri: &str, f: impl FnOnce(&mut Resource)) {
        let mut resources = self.resources.lock().unwrap();
        f(resources.get_mut(uri).expect("resource not served"));
    }

    /// Fail the next `n` fetches of `uri` with a 503.
    pub fn fail_times(&self, uri: &str, n: u32) {
        self.with_resource(uri, |r| r.failures_left = n);
    }

    /// Break the body of the next `n` fetches after `after_bytes`.
    pub fn interrupt_times(&self, uri: &str, n: u32, after_bytes: usize) {
        self.with_resource(uri, |r| r.interrupts = Some((n, after_bytes)));
    }

    /// Do not report the total length.
    pub fn hide_length(&self, uri: &str) {
        self.with_resource(uri, |r| r.report_length = false);
    }

    /// Require one permit per chunk. Starts closed.
    pub fn gate(&self, uri: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.with_resource(uri, |r| r.gate = Some(Arc::clone(&gate)));
        gate
    }

    pub fn requests_for(&self, uri: &str) -> Vec<ByteRange> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == uri)
            .map(|(_, r)| *r)
            .collect()
    }
}

#[async_trait]
impl ResourceFetcherPort for MemoryFetcher {
    async fn fetch(&self, uri: &str, range: ByteRange) -> Result<FetchedResource, DownloadError> {
        self.requests.lock().unwrap().push((uri.to_string(), range));
        let mut resources = self.resources.lock().unwrap();
        let Some(resource) = resources.get_mut(uri) else {
            return Err(DownloadError::other(format!("HTTP 404 Not Found for {uri}")));
        };
        if resource.failures_left > 0 {
            resource.failures_left -= 1;
            return Err(DownloadError::network_with_status("scripted outage", 503));
        }

        let total = resource.body.len() as u64;
        let end = range.end.unwrap_or(total).min(total);
        let start = range.start.min(end);
        let mut slice = resource.body.slice(start as usize..end as usize);

        let mut broken = false;
        if let Some((times, after)) = resource.interrupts {
            if times > 0 {
                slice = slice.slice(..after.min(slice.len()));
                broken = true;
                resource.interrupts = (times > 1).then_some((times - 1, after));
            }
        }

        let mut chunks: Vec<Result<Bytes, DownloadError>> = slice
            .chunks(resource.chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if broken {
            chunks.push(Err(DownloadError::network("connection reset")));
        }

        let gate = resource.gate.clone();
        let body = stream::iter(chunks)
            .then(move |chunk| {
                let gate = gate.clone();
                async move {
                    if let Some(gate) = gate {
                        gate.acquire().await.unwrap().forget();
                    }
                    chunk
                }
            })
            .boxed();

        Ok(FetchedResource {
            total_length: resource.report_length.then_some(total),
            body,
        })
    }
}

// ── Listener ────────────────────────────────────────────────────────

/// Records every delivered event.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<DeliveredEvent>>,
}

impl RecordingListener {
    pub fn events(&self) -> Vec<DeliveredEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Change events for one job, in delivery order.
    pub fn changes_for(&self, id: &str) -> Vec<JobChanged> {
        self.events()
            .into_iter()
            .filter_map(|e| match e.event {
                JobEvent::Changed(change) if change.id == id => Some(change),
                _ => None,
            })
            .collect()
    }

    /// Distinct states a job passed through (progress events collapsed).
    pub fn states_for(&self, id: &str) -> Vec<JobState> {
        let mut states: Vec<JobState> = Vec::new();
        for change in self.changes_for(id) {
            if states.last() != Some(&change.state) {
                states.push(change.state);
            }
        }
        states
    }

    pub fn removed(&self, id: &str) -> bool {
        self.events()
            .iter()
            .any(|e| matches!(&e.event, JobEvent::Removed { id: removed } if removed == id))
    }
}

#[async_trait]
impl JobListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_event(&self, event: &DeliveredEvent) -> Result<(), ListenerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

// ── Index ───────────────────────────────────────────────────────────

/// Index wrapper whose writes can be made to fail.
pub struct FlakyIndex {
    inner: Arc<dyn DownloadIndexPort>,
    fail_writes: AtomicBool,
}

impl FlakyIndex {
    pub fn new(inner: Arc<dyn DownloadIndexPort>) -> Self {
        Self {
            inner,
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RepositoryError::Storage("disk full".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DownloadIndexPort for FlakyIndex {
    async fn put(&self, record: &JobRecord) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>, RepositoryError> {
        self.inner.get(id).await
    }

    async fn remove(&self, id: &str) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.remove(id).await
    }

    async fn list_all(&self) -> Result<Vec<JobRecord>, RepositoryError> {
        self.inner.list_all().await
    }
}

// ── Harness ─────────────────────────────────────────────────────────

/// Poll `check` until it holds, panicking after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn test_config(dir: &std::path::Path) -> EngineConfig {
    EngineConfig::new(dir.to_path_buf())
        .with_retry_delay(Duration::from_millis(10))
        .with_progress_coalescing(Duration::ZERO, 0)
        .with_cancel_timeout(Duration::from_secs(2))
        .with_chunk_size(8)
}

pub fn body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

pub fn key_for(uri: &str) -> CacheKey {
    CacheKey::for_resource(uri, None)
}

/// A running engine over a temp directory.
pub struct Harness {
    pub dir: TempDir,
    pub config: EngineConfig,
    pub stores: Stores,
    pub index: Arc<FlakyIndex>,
    pub fetcher: Arc<MemoryFetcher>,
    pub events: Arc<RecordingListener>,
    pub sink: Option<Arc<dyn SignalSinkPort>>,
    pub ctx: OrchestratorContext,
}

impl Harness {
    pub async fn new() -> Self {
        Self::build(|c| c, None).await
    }

    pub async fn with_config(f: impl FnOnce(EngineConfig) -> EngineConfig) -> Self {
        Self::build(f, None).await
    }

    pub async fn with_sink(sink: Arc<dyn SignalSinkPort>) -> Self {
        Self::build(|c| c, Some(sink)).await
    }

    async fn build(
        f: impl FnOnce(EngineConfig) -> EngineConfig,
        sink: Option<Arc<dyn SignalSinkPort>>,
    ) -> Self {
        let dir = TempDir::new().unwrap();
        let config = f(test_config(dir.path()));
        let pool = setup_database(&config.database_path()).await.unwrap();
        let stores = DbFactory::build_stores(&pool);
        let index = Arc::new(FlakyIndex::new(Arc::clone(&stores.index)));
        let fetcher = Arc::new(MemoryFetcher::new());
        let events = Arc::new(RecordingListener::default());
        let ctx = Self::open(&config, &stores, &index, &fetcher, &events, sink.clone()).await;
        Self {
            dir,
            config,
            stores,
            index,
            fetcher,
            events,
            sink,
            ctx,
        }
    }

    async fn open(
        config: &EngineConfig,
        stores: &Stores,
        index: &Arc<FlakyIndex>,
        fetcher: &Arc<MemoryFetcher>,
        events: &Arc<RecordingListener>,
        sink: Option<Arc<dyn SignalSinkPort>>,
    ) -> OrchestratorContext {
        let mut deps = OrchestratorDeps::new(index.clone(), fetcher.clone())
            .with_listener(events.clone());
        if let Some(sink) = sink {
            deps = deps.with_signals(sink, Some(Arc::clone(&stores.ledger)));
        }
        let ctx = OrchestratorContext::open(config.clone(), deps).await.unwrap();
        ctx.start();
        ctx
    }

    /// Simulate a process restart: same index, cache and fetcher; fresh
    /// orchestrator and listeners.
    pub async fn restart(&mut self, sink: Option<Arc<dyn SignalSinkPort>>) {
        self.ctx.shutdown().await;
        self.events = Arc::new(RecordingListener::default());
        self.sink = sink;
        self.ctx = Self::open(
            &self.config,
            &self.stores,
            &self.index,
            &self.fetcher,
            &self.events,
            self.sink.clone(),
        )
        .await;
    }

    pub fn engine(&self) -> Arc<dyn DownloadOrchestratorPort> {
        self.ctx.orchestrator()
    }

    pub async fn wait_for_state(&self, id: &str, state: JobState) {
        let engine = self.engine();
        eventually(&format!("{id} to be {state}"), || {
            let engine = Arc::clone(&engine);
            async move { engine.query_state(id).await.ok() == Some(state) }
        })
        .await;
    }

    pub async fn wait_for_cached(&self, uri: &str, bytes: u64) {
        let cache = self.ctx.cache().clone();
        let key = key_for(uri);
        eventually(&format!("{bytes} cached bytes of {uri}"), || {
            let cached = cache.cached_bytes(&key);
            async move { cached >= bytes }
        })
        .await;
    }

    /// Wait until the recording listener has seen everything published.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
