//! Byte-range content cache with a global size budget.
//!
//! Resources are stored as sparse sets of spans per [`CacheKey`]. The sum of
//! all span lengths never exceeds the budget: before new bytes are committed,
//! least recently used spans of unpinned keys are evicted (the last victim
//! trimmed to exactly the deficit). A write that cannot be made to fit fails
//! with [`DownloadError::CacheFull`] and leaves the cache unchanged.
//!
//! # Concurrency
//!
//! Bookkeeping lives in a synchronous [`CacheIndex`] behind a std mutex that
//! is never held across an await. File operations on one key are serialized
//! by a per-key async lock; they run on the blocking pool.

mod index;
mod reader;
mod store;

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use mediadl_core::{ByteRange, CacheKey, DownloadError};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use index::{CacheIndex, EvictionStep};
use store::KeyMeta;

/// Usage summary for one cached resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub cached_bytes: u64,
    pub content_length: Option<u64>,
    pub spans: usize,
    pub pinned: bool,
}

/// Shared handle to the content cache. Cheap to clone.
#[derive(Clone)]
pub struct ContentCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    root: PathBuf,
    chunk_size: usize,
    index: Mutex<CacheIndex>,
    key_locks: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

/// Keeps a key out of eviction while alive.
pub struct PinGuard {
    inner: Arc<CacheInner>,
    key: CacheKey,
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.inner.lock_index().unpin(&self.key);
    }
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("root", &self.inner.root)
            .finish_non_exhaustive()
    }
}

fn join_error(e: &tokio::task::JoinError) -> DownloadError {
    DownloadError::other(format!("cache task failed: {e}"))
}

impl CacheInner {
    fn lock_index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key_lock(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .key_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    fn key_dir(&self, key: &CacheKey) -> PathBuf {
        store::key_dir(&self.root, key)
    }

    /// Make room for `incoming` bytes. Caller holds the index lock.
    fn evict_locked(&self, index: &mut CacheIndex, incoming: u64) -> Result<(), DownloadError> {
        let steps = index.plan_eviction(incoming)?;
        for step in &steps {
            let (key, io_result) = match step {
                EvictionStep::Remove { key, start, len } => {
                    tracing::debug!(key = %key, start, len, "Evicting span");
                    (key, store::remove_file(&store::span_path(&self.key_dir(key), *start)))
                }
                EvictionStep::Trim {
                    key,
                    start,
                    keep,
                    freed,
                } => {
                    tracing::debug!(key = %key, start, freed, "Trimming span");
                    let path = store::span_path(&self.key_dir(key), *start);
                    // Truncation moves the mtime; put the stamp back.
                    let io_result = store::truncate_span(&path, *keep).and_then(|()| {
                        index
                            .span_tick(key, *start)
                            .map_or(Ok(()), |tick| store::stamp_span(&path, tick))
                    });
                    (key, io_result)
                }
            };
            if let Err(e) = io_result {
                tracing::warn!(key = %key, error = %e, "Eviction failed");
                return Err(DownloadError::from_io_error(&e));
            }
            if index.apply_step(step) {
                if let Err(e) = store::remove_dir(&self.key_dir(key)) {
                    tracing::warn!(key = %key, error = %e, "Could not remove evicted cache entry");
                }
            }
        }
        Ok(())
    }

    fn open_blocking(root: PathBuf, budget: u64, chunk_size: usize) -> Result<Self, DownloadError> {
        let scanned = store::scan(&root)?;

        let mut spans: Vec<_> = scanned
            .iter()
            .flat_map(|k| k.spans.iter().map(move |s| (s.stamp, &k.key, s.start, s.len)))
            .collect();
        spans.sort_by_key(|(stamp, ..)| *stamp);

        let mut index = CacheIndex::new(budget);
        for entry in &scanned {
            if let Some(len) = entry.content_length {
                index.set_content_length(&entry.key, len);
            }
        }
        let mut last_tick = 0;
        for (stamp, key, start, len) in spans {
            // Equal stamps keep scan order.
            let tick = stamp.max(last_tick + 1);
            index.insert_span_with_tick(key, start, len, tick);
            last_tick = tick;
        }

        let inner = Self {
            root,
            chunk_size: chunk_size.max(1),
            index: Mutex::new(CacheIndex::new(budget)),
            key_locks: Mutex::new(HashMap::new()),
        };
        if index.total() > budget {
            tracing::info!(total = index.total(), budget, "Cache over budget on open, evicting");
            inner.evict_locked(&mut index, 0)?;
        }
        tracing::info!(
            keys = scanned.len(),
            total = index.total(),
            budget,
            "Content cache opened"
        );
        *inner.lock_index() = index;
        Ok(inner)
    }

    fn write_blocking(&self, key: &CacheKey, offset: u64, data: &[u8]) -> Result<u64, DownloadError> {
        let end = offset + data.len() as u64;
        let dir = self.key_dir(key);

        let (gaps, needed) = {
            let mut index = self.lock_index();
            let gaps = index
                .key(key)
                .map_or_else(|| vec![(offset, end)], |entry| entry.uncovered(offset, end));
            let needed: u64 = gaps.iter().map(|(s, e)| e - s).sum();
            if needed == 0 {
                let covering = index.key(key).and_then(|entry| entry.covering(offset));
                if let Some((start, _)) = covering {
                    index.touch(key, start);
                    drop(index);
                    self.persist_recency(key, start);
                }
                return Ok(0);
            }
            self.evict_locked(&mut index, needed)?;
            if !store::has_meta(&dir) {
                let meta = KeyMeta {
                    key: key.as_str().to_string(),
                    content_length: index.key(key).and_then(|entry| entry.content_length),
                };
                store::write_meta(&dir, &meta)?;
            }
            index.ensure_key(key);
            index.reserve(needed);
            (gaps, needed)
        };

        let mut outstanding = needed;
        for (gap_start, gap_end) in gaps {
            let lo = usize::try_from(gap_start - offset).unwrap_or(usize::MAX);
            let hi = usize::try_from(gap_end - offset).unwrap_or(usize::MAX);
            if let Err(e) = self.write_gap(key, &dir, gap_start, &data[lo..hi]) {
                self.lock_index().release(outstanding);
                return Err(DownloadError::from_io_error(&e));
            }
            outstanding -= gap_end - gap_start;
        }
        Ok(needed)
    }

    /// Write one uncovered run and commit it. Releases its reservation on success.
    fn write_gap(&self, key: &CacheKey, dir: &Path, gap_start: u64, data: &[u8]) -> io::Result<()> {
        let len = data.len() as u64;
        let prev = self
            .lock_index()
            .key(key)
            .and_then(|entry| entry.ending_at(gap_start));

        let span_start = match prev {
            Some((prev_start, prev_span)) => {
                let path = store::span_path(dir, prev_start);
                if let Err(e) = store::append_span(&path, data) {
                    if let Err(cleanup) = store::truncate_span(&path, prev_span.len) {
                        self.discard_span(key, dir, prev_start, &cleanup);
                    }
                    return Err(e);
                }
                let mut index = self.lock_index();
                index.release(len);
                index.extend_span(key, prev_start, len);
                prev_start
            }
            None => {
                let path = store::span_path(dir, gap_start);
                if let Err(e) = store::create_span(&path, data) {
                    let _ = store::remove_file(&path);
                    return Err(e);
                }
                let mut index = self.lock_index();
                index.release(len);
                index.insert_span(key, gap_start, len);
                gap_start
            }
        };

        self.merge_following(key, dir, span_start);
        self.persist_recency(key, span_start);
        Ok(())
    }

    /// Store the span's current access stamp on disk so a reopen sees it.
    fn persist_recency(&self, key: &CacheKey, start: u64) {
        let Some(tick) = self.lock_index().span_tick(key, start) else {
            return;
        };
        let path = store::span_path(&self.key_dir(key), start);
        if let Err(e) = store::stamp_span(&path, tick) {
            tracing::debug!(key = %key, start, error = %e, "Could not persist span recency");
        }
    }

    /// Forget a span whose file no longer matches the index.
    ///
    /// Appending to such a file would misplace every later byte, so the span
    /// is dropped from the index and its file deleted.
    fn discard_span(&self, key: &CacheKey, dir: &Path, start: u64, cause: &io::Error) {
        tracing::warn!(key = %key, start, error = %cause, "Span file out of step with index, discarding");
        self.lock_index().remove_span(key, start);
        let path = store::span_path(dir, start);
        if let Err(e) = store::remove_file(&path) {
            tracing::warn!(key = %key, start, error = %e, "Could not delete discarded span");
        }
    }

    /// Fold the span directly after `span_start`'s span into it, if any.
    fn merge_following(&self, key: &CacheKey, dir: &Path, span_start: u64) {
        let (head_len, next_start) = {
            let index = self.lock_index();
            let Some(entry) = index.key(key) else { return };
            let Some(head) = entry.spans.get(&span_start) else {
                return;
            };
            let next_start = span_start + head.len;
            if !entry.spans.contains_key(&next_start) {
                return;
            }
            (head.len, next_start)
        };

        let head_path = store::span_path(dir, span_start);
        let next_path = store::span_path(dir, next_start);
        if let Err(e) = store::append_file(&head_path, &next_path) {
            // Adjacent spans are still valid on their own.
            tracing::warn!(key = %key, error = %e, "Could not merge adjacent spans");
            if let Err(cleanup) = store::truncate_span(&head_path, head_len) {
                self.discard_span(key, dir, span_start, &cleanup);
            }
            return;
        }
        self.lock_index().merge_next(key, span_start);
        if let Err(e) = store::remove_file(&next_path) {
            tracing::warn!(key = %key, error = %e, "Could not remove merged span file");
        }
    }

    fn read_blocking(&self, key: &CacheKey, pos: u64, max: usize) -> Result<Option<Bytes>, DownloadError> {
        let (start, offset, len) = {
            let mut index = self.lock_index();
            let Some((start, span)) = index.key(key).and_then(|entry| entry.covering(pos)) else {
                return Ok(None);
            };
            index.touch(key, start);
            let available = usize::try_from(start + span.len - pos).unwrap_or(usize::MAX);
            (start, pos - start, available.min(max))
        };
        let path = store::span_path(&self.key_dir(key), start);
        let bytes = store::read_span(&path, offset, len)?;
        if bytes.is_empty() {
            return Ok(None);
        }
        self.persist_recency(key, start);
        Ok(Some(Bytes::from(bytes)))
    }
}

impl ContentCache {
    /// Open the cache rooted at `root`, rebuilding bookkeeping from disk.
    ///
    /// Recency is restored from the access stamps kept as span modification
    /// times. If the cache is
    /// over `budget` (e.g. the budget shrank), it is evicted down to it.
    pub async fn open(
        root: impl Into<PathBuf>,
        budget: u64,
        chunk_size: usize,
    ) -> Result<Self, DownloadError> {
        let root = root.into();
        let inner =
            tokio::task::spawn_blocking(move || CacheInner::open_blocking(root, budget, chunk_size))
                .await
                .map_err(|e| join_error(&e))??;
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn budget(&self) -> u64 {
        self.inner.lock_index().budget()
    }

    /// Sum of all cached span lengths.
    pub fn total_size(&self) -> u64 {
        self.inner.lock_index().total()
    }

    pub(crate) fn chunk_size(&self) -> usize {
        self.inner.chunk_size
    }

    /// Bytes cached for `key`.
    pub fn cached_bytes(&self, key: &CacheKey) -> u64 {
        self.inner
            .lock_index()
            .key(key)
            .map_or(0, |entry| entry.size)
    }

    pub fn content_length(&self, key: &CacheKey) -> Option<u64> {
        self.inner
            .lock_index()
            .key(key)
            .and_then(|entry| entry.content_length)
    }

    /// Whether every byte of `key` is cached. False while the length is unknown.
    pub fn is_fully_cached(&self, key: &CacheKey) -> bool {
        self.inner
            .lock_index()
            .key(key)
            .is_some_and(index::KeyEntry::is_complete)
    }

    /// First uncovered range of `key` at or after `from`.
    pub fn first_gap(&self, key: &CacheKey, from: u64) -> Option<ByteRange> {
        let index = self.inner.lock_index();
        let (start, end) = match index.key(key) {
            Some(entry) => entry.first_gap(from)?,
            None => (from, None),
        };
        Some(ByteRange { start, end })
    }

    /// Per-key usage, largest first.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let index = self.inner.lock_index();
        let mut entries: Vec<CacheEntryInfo> = index
            .keys()
            .map(|(key, entry)| CacheEntryInfo {
                key: key.as_str().to_string(),
                cached_bytes: entry.size,
                content_length: entry.content_length,
                spans: entry.spans.len(),
                pinned: index.is_pinned(key),
            })
            .collect();
        entries.sort_by(|a, b| b.cached_bytes.cmp(&a.cached_bytes).then(a.key.cmp(&b.key)));
        entries
    }

    /// Protect `key` from eviction until the guard is dropped.
    pub fn pin(&self, key: &CacheKey) -> PinGuard {
        self.inner.lock_index().pin(key);
        PinGuard {
            inner: Arc::clone(&self.inner),
            key: key.clone(),
        }
    }

    async fn lock_key(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        self.inner.key_lock(key).lock_owned().await
    }

    /// Record the total length of `key`'s resource.
    pub async fn set_content_length(&self, key: &CacheKey, len: u64) -> Result<(), DownloadError> {
        {
            let index = self.inner.lock_index();
            if index.key(key).and_then(|entry| entry.content_length) == Some(len) {
                return Ok(());
            }
        }
        let guard = self.lock_key(key).await;
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::task::spawn_blocking(move || -> Result<(), DownloadError> {
            let _guard = guard;
            let dir = inner.key_dir(&key);
            store::write_meta(
                &dir,
                &KeyMeta {
                    key: key.as_str().to_string(),
                    content_length: Some(len),
                },
            )?;
            inner.lock_index().set_content_length(&key, len);
            Ok(())
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    /// Store `data` at `offset` of `key`.
    ///
    /// Only the sub-ranges not already cached are written. Returns the
    /// number of new bytes. Fails with `CacheFull` when the new bytes cannot
    /// fit even after evicting every unpinned span.
    pub async fn write(&self, key: &CacheKey, offset: u64, data: Bytes) -> Result<u64, DownloadError> {
        if data.is_empty() {
            return Ok(0);
        }
        let pin = self.pin(key);
        let guard = self.lock_key(key).await;
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            let _pin = pin;
            inner.write_blocking(&key, offset, &data)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    /// Read up to `max` cached bytes of `key` starting at `pos`.
    ///
    /// Returns `None` when `pos` is not cached.
    pub async fn read_chunk(
        &self,
        key: &CacheKey,
        pos: u64,
        max: usize,
    ) -> Result<Option<Bytes>, DownloadError> {
        let guard = self.lock_key(key).await;
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        tokio::task::spawn_blocking(move || {
            let _guard = guard;
            inner.read_blocking(&key, pos, max)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    /// Evict until `incoming` more bytes fit.
    pub async fn evict_if_needed(&self, incoming: u64) -> Result<(), DownloadError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut index = inner.lock_index();
            inner.evict_locked(&mut index, incoming)
        })
        .await
        .map_err(|e| join_error(&e))?
    }

    /// Delete every span of `key`. Returns the bytes freed.
    pub async fn remove_key(&self, key: &CacheKey) -> Result<u64, DownloadError> {
        let guard = self.lock_key(key).await;
        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let freed = tokio::task::spawn_blocking(move || -> Result<u64, DownloadError> {
            let _guard = guard;
            store::remove_dir(&inner.key_dir(&key))?;
            let freed = inner.lock_index().remove_key(&key).map_or(0, |entry| entry.size);
            Ok(freed)
        })
        .await
        .map_err(|e| join_error(&e))??;
        tracing::debug!(freed, "Removed cache entry");
        Ok(freed)
    }
}
