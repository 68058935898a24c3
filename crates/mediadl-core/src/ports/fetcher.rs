//! Upstream resource fetch port.
//!
//! Transport is an external collaborator; the engine only asks for byte
//! ranges and consumes the resulting stream.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::job::DownloadError;

/// Stream of body chunks from the upstream.
pub type ByteStream = BoxStream<'static, Result<Bytes, DownloadError>>;

/// Half-open byte range `[start, end)`; `end = None` means "to end of resource".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    /// Range from `start` to the end of the resource.
    #[must_use]
    pub const fn from(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Range `[start, end)`.
    #[must_use]
    pub const fn bounded(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// Length of the range if bounded.
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        match self.end {
            Some(end) => Some(end.saturating_sub(self.start)),
            None => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.len(), Some(0))
    }
}

/// Response to a range fetch.
pub struct FetchedResource {
    /// Total length of the resource, if the upstream reported it.
    pub total_length: Option<u64>,
    /// Body bytes starting exactly at the requested offset.
    pub body: ByteStream,
}

impl std::fmt::Debug for FetchedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResource")
            .field("total_length", &self.total_length)
            .finish_non_exhaustive()
    }
}

/// Port for fetching resource bytes.
///
/// Implementations return `DownloadError::Network` for transient faults so
/// the orchestrator can re-queue the job.
#[async_trait]
pub trait ResourceFetcherPort: Send + Sync {
    /// Open a byte stream for `range` of `uri`.
    async fn fetch(&self, uri: &str, range: ByteRange) -> Result<FetchedResource, DownloadError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_len() {
        assert_eq!(ByteRange::bounded(10, 30).len(), Some(20));
        assert_eq!(ByteRange::from(5).len(), None);
        assert!(ByteRange::bounded(4, 4).is_empty());
        assert!(!ByteRange::from(0).is_empty());
    }
}
