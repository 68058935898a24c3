//! Read-through streaming over the cache.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use mediadl_core::{ByteRange, ByteStream, CacheKey, DownloadError, ResourceFetcherPort};

use super::{ContentCache, PinGuard};

struct Upstream {
    body: ByteStream,
    /// Where this fetch stops being useful: the next cached span, the
    /// requested end, or unknown.
    until: Option<u64>,
}

struct ReadState {
    cache: ContentCache,
    key: CacheKey,
    uri: String,
    upstream: Arc<dyn ResourceFetcherPort>,
    pos: u64,
    end: Option<u64>,
    fetch: Option<Upstream>,
    _pin: PinGuard,
}

impl ContentCache {
    /// Stream `range` of `key`, serving cached spans and fetching the gaps.
    ///
    /// Fetched bytes are written through to the cache before they are
    /// yielded, so an interrupted read keeps what it got. The key is pinned
    /// until the stream is dropped. A requested end past the resource length
    /// is clamped once the length is known. An upstream that ends before the
    /// known end yields `Interrupted`.
    pub fn open_for_read(
        &self,
        key: &CacheKey,
        uri: &str,
        range: ByteRange,
        upstream: Arc<dyn ResourceFetcherPort>,
    ) -> ByteStream {
        let state = ReadState {
            cache: self.clone(),
            key: key.clone(),
            uri: uri.to_string(),
            upstream,
            pos: range.start,
            end: range.end,
            fetch: None,
            _pin: self.pin(key),
        };
        stream::try_unfold(state, |mut state| async move {
            let next = state.next_chunk().await?;
            Ok(next.map(|chunk| (chunk, state)))
        })
        .boxed()
    }
}

/// The smaller of two optional bounds; `None` only when both are unknown.
fn earliest(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

impl ReadState {
    fn limit(&self) -> Option<u64> {
        earliest(self.end, self.cache.content_length(&self.key))
    }

    async fn next_chunk(&mut self) -> Result<Option<Bytes>, DownloadError> {
        loop {
            let limit = self.limit();
            if limit.is_some_and(|end| self.pos >= end) {
                return Ok(None);
            }

            if let Some(upstream) = self.fetch.as_mut() {
                let until = earliest(upstream.until, limit);
                match upstream.body.next().await {
                    Some(chunk) => {
                        let mut chunk = chunk?;
                        if let Some(until) = until {
                            let room = until.saturating_sub(self.pos);
                            if chunk.len() as u64 > room {
                                chunk.truncate(usize::try_from(room).unwrap_or(usize::MAX));
                            }
                        }
                        if !chunk.is_empty() {
                            self.cache.write(&self.key, self.pos, chunk.clone()).await?;
                            self.pos += chunk.len() as u64;
                        }
                        if until.is_some_and(|u| self.pos >= u) {
                            self.fetch = None;
                        }
                        if chunk.is_empty() {
                            continue;
                        }
                        return Ok(Some(chunk));
                    }
                    None => {
                        self.fetch = None;
                        match until {
                            Some(end) if self.pos < end => {
                                return Err(DownloadError::Interrupted {
                                    bytes_downloaded: self.pos,
                                });
                            }
                            Some(_) => continue,
                            None => {
                                self.cache.set_content_length(&self.key, self.pos).await?;
                                return Ok(None);
                            }
                        }
                    }
                }
            }

            let chunk_size = self.cache.chunk_size();
            let max = limit.map_or(chunk_size, |end| {
                usize::try_from(end - self.pos)
                    .unwrap_or(usize::MAX)
                    .min(chunk_size)
            });
            if let Some(chunk) = self.cache.read_chunk(&self.key, self.pos, max).await? {
                self.pos += chunk.len() as u64;
                return Ok(Some(chunk));
            }

            let gap_end = self
                .cache
                .first_gap(&self.key, self.pos)
                .and_then(|gap| gap.end);
            let until = earliest(gap_end, self.end);
            tracing::debug!(key = %self.key, start = self.pos, end = ?until, "Fetching uncached range");
            let fetched = self
                .upstream
                .fetch(&self.uri, ByteRange {
                    start: self.pos,
                    end: until,
                })
                .await?;
            if let Some(total) = fetched.total_length {
                self.cache.set_content_length(&self.key, total).await?;
            }
            self.fetch = Some(Upstream {
                body: fetched.body,
                until,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures_util::TryStreamExt;
    use mediadl_core::FetchedResource;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct StaticFetcher {
        body: Vec<u8>,
        ranges: Mutex<Vec<ByteRange>>,
    }

    #[async_trait]
    impl ResourceFetcherPort for StaticFetcher {
        async fn fetch(&self, _uri: &str, range: ByteRange) -> Result<FetchedResource, DownloadError> {
            self.ranges.lock().unwrap().push(range);
            let total = self.body.len() as u64;
            let end = range.end.unwrap_or(total).min(total);
            let slice = self.body[range.start as usize..end as usize].to_vec();
            let chunks: Vec<Result<Bytes, DownloadError>> =
                slice.chunks(7).map(|c| Ok(Bytes::copy_from_slice(c))).collect();
            Ok(FetchedResource {
                total_length: Some(total),
                body: stream::iter(chunks).boxed(),
            })
        }
    }

    #[tokio::test]
    async fn test_read_through_fills_only_gaps() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(dir.path(), 1000, 8).await.unwrap();
        let key = CacheKey::new("movie");
        let body: Vec<u8> = (0..50).collect();
        cache
            .write(&key, 10, Bytes::copy_from_slice(&body[10..20]))
            .await
            .unwrap();

        let fetcher = Arc::new(StaticFetcher {
            body: body.clone(),
            ranges: Mutex::new(Vec::new()),
        });
        let chunks: Vec<Bytes> = cache
            .open_for_read(&key, "uri", ByteRange::from(0), fetcher.clone())
            .try_collect()
            .await
            .unwrap();

        let read: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(read, body);
        assert_eq!(
            *fetcher.ranges.lock().unwrap(),
            vec![ByteRange::bounded(0, 10), ByteRange::bounded(20, 50)]
        );
        assert!(cache.is_fully_cached(&key));

        // A second read is served from the cache alone.
        let again: Vec<Bytes> = cache
            .open_for_read(&key, "uri", ByteRange::bounded(5, 45), fetcher.clone())
            .try_collect()
            .await
            .unwrap();
        let again: Vec<u8> = again.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(again, body[5..45]);
        assert_eq!(fetcher.ranges.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_range_past_length_ends_cleanly() {
        let dir = TempDir::new().unwrap();
        let cache = ContentCache::open(dir.path(), 1000, 8).await.unwrap();
        let key = CacheKey::new("movie");
        let body: Vec<u8> = (0..50).collect();
        let fetcher = Arc::new(StaticFetcher {
            body: body.clone(),
            ranges: Mutex::new(Vec::new()),
        });

        let chunks: Vec<Bytes> = cache
            .open_for_read(&key, "uri", ByteRange::bounded(40, 80), fetcher.clone())
            .try_collect()
            .await
            .unwrap();
        let read: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(read, body[40..]);
        assert_eq!(cache.content_length(&key), Some(50));

        // Served from the cache the second time, still without an error.
        let again: Vec<Bytes> = cache
            .open_for_read(&key, "uri", ByteRange::bounded(45, 80), fetcher.clone())
            .try_collect()
            .await
            .unwrap();
        assert_eq!(again.iter().map(Bytes::len).sum::<usize>(), 5);
        assert_eq!(fetcher.ranges.lock().unwrap().len(), 1);
    }
}
