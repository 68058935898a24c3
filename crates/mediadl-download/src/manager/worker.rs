//! Transfer worker.
//!
//! Fills every gap in a job's cache key until the resource is fully cached.
//! The worker owns no job state: it writes bytes to the cache and progress to
//! a `watch::Sender`. The orchestrator turns its result into a transition.

use std::sync::Arc;

use futures_util::StreamExt;
use mediadl_core::{ByteRange, CacheKey, DownloadError, ResourceFetcherPort};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::cache::ContentCache;
use crate::progress::ProgressUpdate;

/// Dependencies for a transfer.
#[derive(Clone)]
pub struct WorkerDeps {
    pub cache: ContentCache,
    pub fetcher: Arc<dyn ResourceFetcherPort>,
}

/// A single transfer to execute.
pub struct TransferJob {
    pub id: String,
    pub resource_uri: String,
    pub cache_key: CacheKey,
    pub cancel: CancellationToken,
    pub progress_tx: watch::Sender<ProgressUpdate>,
}

/// Result of a finished transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedTransfer {
    pub bytes: u64,
    pub content_length: u64,
}

fn report(job: &TransferJob, cache: &ContentCache) {
    let downloaded = cache.cached_bytes(&job.cache_key);
    let total = cache.content_length(&job.cache_key);
    job.progress_tx.send_modify(|update| {
        *update = ProgressUpdate::new(downloaded, total, update.seq + 1);
    });
}

/// Run a transfer to completion, cancellation, or error.
///
/// Bytes already cached are never fetched again, so a re-queued or resumed
/// job continues where it stopped.
pub async fn run_transfer(
    job: TransferJob,
    deps: &WorkerDeps,
) -> Result<CompletedTransfer, DownloadError> {
    let _pin = deps.cache.pin(&job.cache_key);
    report(&job, &deps.cache);

    while let Some(gap) = deps.cache.first_gap(&job.cache_key, 0) {
        if job.cancel.is_cancelled() {
            return Err(DownloadError::Cancelled);
        }
        transfer_gap(&job, deps, gap).await?;
    }

    let bytes = deps.cache.cached_bytes(&job.cache_key);
    match deps.cache.content_length(&job.cache_key) {
        Some(content_length) if deps.cache.is_fully_cached(&job.cache_key) => {
            tracing::debug!(id = %job.id, bytes, "Transfer finished");
            Ok(CompletedTransfer {
                bytes,
                content_length,
            })
        }
        _ => Err(DownloadError::other(format!(
            "resource {} incomplete after transfer",
            job.resource_uri
        ))),
    }
}

async fn transfer_gap(
    job: &TransferJob,
    deps: &WorkerDeps,
    gap: ByteRange,
) -> Result<(), DownloadError> {
    tracing::debug!(id = %job.id, start = gap.start, end = ?gap.end, "Fetching gap");
    let fetched = tokio::select! {
        biased;
        () = job.cancel.cancelled() => return Err(DownloadError::Cancelled),
        result = deps.fetcher.fetch(&job.resource_uri, gap) => result?,
    };
    if let Some(total) = fetched.total_length {
        deps.cache.set_content_length(&job.cache_key, total).await?;
    }

    let limit = gap.end.or(fetched.total_length);
    let mut body = fetched.body;
    let mut pos = gap.start;
    loop {
        if limit.is_some_and(|limit| pos >= limit) {
            break;
        }
        let next = tokio::select! {
            biased;
            () = job.cancel.cancelled() => return Err(DownloadError::Cancelled),
            next = body.next() => next,
        };
        let Some(chunk) = next else { break };
        let mut chunk = chunk?;
        if let Some(limit) = limit {
            let room = usize::try_from(limit - pos).unwrap_or(usize::MAX);
            chunk.truncate(room);
        }
        if chunk.is_empty() {
            continue;
        }
        let len = chunk.len() as u64;
        deps.cache.write(&job.cache_key, pos, chunk).await?;
        pos += len;
        report(job, &deps.cache);
    }

    match limit {
        Some(limit) if pos < limit => Err(DownloadError::Interrupted {
            bytes_downloaded: deps.cache.cached_bytes(&job.cache_key),
        }),
        Some(_) => Ok(()),
        None => {
            // No length from anywhere: the stream's end is the resource's end.
            deps.cache.set_content_length(&job.cache_key, pos).await?;
            report(job, &deps.cache);
            Ok(())
        }
    }
}
