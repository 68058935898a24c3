//! In-memory bookkeeping for the content cache.
//!
//! Pure and synchronous: no file I/O and no locking. [`super::ContentCache`]
//! owns one index behind a mutex and mirrors every change onto disk.
//!
//! Access ticks are wall-clock nanoseconds, bumped to stay strictly
//! increasing, so they can be stored as span modification times and
//! compared again after a restart.
//!
//! # Invariants
//!
//! - Spans of one key never overlap; adjacent spans are merged by the writer.
//! - `total` is the sum of all span lengths.
//! - `total + reserved <= budget` after every successful reservation.
//! - A key whose last span is removed is dropped.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::time::{SystemTime, UNIX_EPOCH};

use mediadl_core::{CacheKey, DownloadError};

/// One contiguous run of cached bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub len: u64,
    /// Last-access stamp in nanoseconds; higher is more recent.
    pub tick: u64,
}

/// Spans and metadata for one cache key.
#[derive(Debug, Default, Clone)]
pub struct KeyEntry {
    /// Spans keyed by start offset.
    pub spans: BTreeMap<u64, Span>,
    pub size: u64,
    pub content_length: Option<u64>,
}

impl KeyEntry {
    /// The span containing `pos`, as `(start, span)`.
    pub fn covering(&self, pos: u64) -> Option<(u64, Span)> {
        self.spans
            .range(..=pos)
            .next_back()
            .filter(|(start, span)| pos < *start + span.len)
            .map(|(start, span)| (*start, *span))
    }

    /// The span ending exactly at `pos`.
    pub fn ending_at(&self, pos: u64) -> Option<(u64, Span)> {
        self.spans
            .range(..pos)
            .next_back()
            .filter(|(start, span)| *start + span.len == pos)
            .map(|(start, span)| (*start, *span))
    }

    /// Start of the first span beginning after `pos`.
    pub fn next_start_after(&self, pos: u64) -> Option<u64> {
        self.spans
            .range((Bound::Excluded(pos), Bound::Unbounded))
            .next()
            .map(|(start, _)| *start)
    }

    /// Sub-ranges of `[start, end)` not covered by any span.
    pub fn uncovered(&self, start: u64, end: u64) -> Vec<(u64, u64)> {
        let mut gaps = Vec::new();
        let mut cursor = start;
        if let Some((s, span)) = self.covering(start) {
            cursor = s + span.len;
        }
        for (&s, span) in self.spans.range(start..end) {
            if s > cursor {
                gaps.push((cursor, s));
            }
            cursor = cursor.max(s + span.len);
            if cursor >= end {
                break;
            }
        }
        if cursor < end {
            gaps.push((cursor, end));
        }
        gaps
    }

    /// First uncovered range at or after `from`, as `(start, end)`.
    ///
    /// `end` is the next cached span or the content length; `None` when
    /// neither is known. Returns `None` once everything up to the known
    /// content length is cached.
    pub fn first_gap(&self, from: u64) -> Option<(u64, Option<u64>)> {
        let mut cursor = from;
        while let Some((start, span)) = self.covering(cursor) {
            cursor = start + span.len;
        }
        if self.content_length.is_some_and(|len| cursor >= len) {
            return None;
        }
        let end = self.next_start_after(cursor).or(self.content_length);
        Some((cursor, end))
    }

    /// Whether every byte up to the known content length is cached.
    pub fn is_complete(&self) -> bool {
        self.content_length.is_some() && self.first_gap(0).is_none()
    }
}

/// One planned eviction action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvictionStep {
    /// Drop the whole span.
    Remove { key: CacheKey, start: u64, len: u64 },
    /// Shorten the span to `keep` bytes, freeing its tail.
    Trim {
        key: CacheKey,
        start: u64,
        keep: u64,
        freed: u64,
    },
}

/// Global bookkeeping across all keys.
#[derive(Debug)]
pub struct CacheIndex {
    keys: HashMap<CacheKey, KeyEntry>,
    /// Least recently used first.
    lru: BTreeMap<u64, (CacheKey, u64)>,
    pins: HashMap<CacheKey, usize>,
    total: u64,
    reserved: u64,
    budget: u64,
    next_tick: u64,
}

impl CacheIndex {
    pub fn new(budget: u64) -> Self {
        Self {
            keys: HashMap::new(),
            lru: BTreeMap::new(),
            pins: HashMap::new(),
            total: 0,
            reserved: 0,
            budget,
            next_tick: 0,
        }
    }

    pub const fn budget(&self) -> u64 {
        self.budget
    }

    pub const fn total(&self) -> u64 {
        self.total
    }

    pub fn key(&self, key: &CacheKey) -> Option<&KeyEntry> {
        self.keys.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = (&CacheKey, &KeyEntry)> {
        self.keys.iter()
    }

    /// Get or create the entry for `key`. Returns whether it was created.
    pub fn ensure_key(&mut self, key: &CacheKey) -> bool {
        if self.keys.contains_key(key) {
            return false;
        }
        self.keys.insert(key.clone(), KeyEntry::default());
        true
    }

    pub fn set_content_length(&mut self, key: &CacheKey, len: u64) {
        self.ensure_key(key);
        if let Some(entry) = self.keys.get_mut(key) {
            entry.content_length = Some(len);
        }
    }

    fn tick(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
        self.next_tick = (self.next_tick + 1).max(now);
        self.next_tick
    }

    /// Current access stamp of the span at `start`.
    pub fn span_tick(&self, key: &CacheKey, start: u64) -> Option<u64> {
        self.keys.get(key)?.spans.get(&start).map(|span| span.tick)
    }

    /// Insert a span that overlaps nothing, with a fresh access tick.
    pub fn insert_span(&mut self, key: &CacheKey, start: u64, len: u64) {
        let tick = self.tick();
        self.insert_span_with_tick(key, start, len, tick);
    }

    /// Insert a span with an explicit tick (used when rebuilding from disk).
    ///
    /// Ticks must be unique across the index.
    pub fn insert_span_with_tick(&mut self, key: &CacheKey, start: u64, len: u64, tick: u64) {
        self.next_tick = self.next_tick.max(tick);
        let entry = self.keys.entry(key.clone()).or_default();
        entry.spans.insert(start, Span { len, tick });
        entry.size += len;
        self.total += len;
        self.lru.insert(tick, (key.clone(), start));
    }

    /// Grow the span at `start` by `extra` bytes and mark it used.
    pub fn extend_span(&mut self, key: &CacheKey, start: u64, extra: u64) {
        let tick = self.tick();
        let Some(entry) = self.keys.get_mut(key) else {
            return;
        };
        let Some(span) = entry.spans.get_mut(&start) else {
            return;
        };
        self.lru.remove(&span.tick);
        span.len += extra;
        span.tick = tick;
        entry.size += extra;
        self.total += extra;
        self.lru.insert(tick, (key.clone(), start));
    }

    /// Fold the span starting right after `start`'s span into it.
    ///
    /// Returns the folded span's start, if there was one.
    pub fn merge_next(&mut self, key: &CacheKey, start: u64) -> Option<u64> {
        let tick = self.tick();
        let entry = self.keys.get_mut(key)?;
        let head = *entry.spans.get(&start)?;
        let next_start = start + head.len;
        let next = entry.spans.remove(&next_start)?;
        self.lru.remove(&next.tick);
        self.lru.remove(&head.tick);
        entry.spans.insert(
            start,
            Span {
                len: head.len + next.len,
                tick,
            },
        );
        self.lru.insert(tick, (key.clone(), start));
        Some(next_start)
    }

    /// Mark the span at `start` as most recently used.
    pub fn touch(&mut self, key: &CacheKey, start: u64) {
        let tick = self.tick();
        let Some(span) = self
            .keys
            .get_mut(key)
            .and_then(|entry| entry.spans.get_mut(&start))
        else {
            return;
        };
        self.lru.remove(&span.tick);
        span.tick = tick;
        self.lru.insert(tick, (key.clone(), start));
    }

    pub fn pin(&mut self, key: &CacheKey) {
        *self.pins.entry(key.clone()).or_insert(0) += 1;
    }

    pub fn unpin(&mut self, key: &CacheKey) {
        if let Some(count) = self.pins.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.pins.remove(key);
            }
        }
    }

    pub fn is_pinned(&self, key: &CacheKey) -> bool {
        self.pins.contains_key(key)
    }

    pub const fn reserve(&mut self, bytes: u64) {
        self.reserved += bytes;
    }

    pub const fn release(&mut self, bytes: u64) {
        self.reserved = self.reserved.saturating_sub(bytes);
    }

    /// Plan evictions so `incoming` more bytes fit in the budget.
    ///
    /// Victims are taken least recently used first, skipping pinned keys.
    /// The last victim is trimmed by exactly the remaining deficit.
    pub fn plan_eviction(&self, incoming: u64) -> Result<Vec<EvictionStep>, DownloadError> {
        let used = self.total + self.reserved;
        if used + incoming <= self.budget {
            return Ok(Vec::new());
        }
        if incoming > self.budget {
            return Err(DownloadError::cache_full(incoming, self.budget));
        }

        let mut deficit = used + incoming - self.budget;
        let mut steps = Vec::new();
        for (key, start) in self.lru.values() {
            if self.is_pinned(key) {
                continue;
            }
            let Some(span) = self.keys.get(key).and_then(|e| e.spans.get(start)) else {
                continue;
            };
            if span.len <= deficit {
                deficit -= span.len;
                steps.push(EvictionStep::Remove {
                    key: key.clone(),
                    start: *start,
                    len: span.len,
                });
            } else {
                steps.push(EvictionStep::Trim {
                    key: key.clone(),
                    start: *start,
                    keep: span.len - deficit,
                    freed: deficit,
                });
                deficit = 0;
            }
            if deficit == 0 {
                return Ok(steps);
            }
        }
        Err(DownloadError::cache_full(incoming, self.budget))
    }

    /// Apply one eviction step. Returns `true` when the key became empty
    /// and was dropped.
    pub fn apply_step(&mut self, step: &EvictionStep) -> bool {
        match step {
            EvictionStep::Remove { key, start, .. } => self.remove_span(key, *start),
            EvictionStep::Trim {
                key, start, keep, ..
            } => {
                if let Some(entry) = self.keys.get_mut(key) {
                    if let Some(span) = entry.spans.get_mut(start) {
                        let freed = span.len - keep;
                        span.len = *keep;
                        entry.size -= freed;
                        self.total -= freed;
                    }
                }
                false
            }
        }
    }

    /// Remove one span. Returns `true` when its key was dropped.
    pub fn remove_span(&mut self, key: &CacheKey, start: u64) -> bool {
        let Some(entry) = self.keys.get_mut(key) else {
            return false;
        };
        let Some(span) = entry.spans.remove(&start) else {
            return false;
        };
        self.lru.remove(&span.tick);
        entry.size -= span.len;
        self.total -= span.len;
        if entry.spans.is_empty() {
            self.keys.remove(key);
            return true;
        }
        false
    }

    /// Drop a key and all its spans.
    pub fn remove_key(&mut self, key: &CacheKey) -> Option<KeyEntry> {
        let entry = self.keys.remove(key)?;
        for span in entry.spans.values() {
            self.lru.remove(&span.tick);
        }
        self.total -= entry.size;
        Some(entry)
    }
}
