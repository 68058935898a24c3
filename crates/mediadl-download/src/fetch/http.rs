//! HTTP range fetcher built on `reqwest`.

use std::future::ready;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use mediadl_core::{ByteRange, DownloadError, FetchedResource, ResourceFetcherPort};
use reqwest::header::{CONTENT_RANGE, RANGE};
use reqwest::{Client, StatusCode};

/// Parsed `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ContentRange {
    start: Option<u64>,
    total: Option<u64>,
}

fn parse_content_range(value: &str) -> Option<ContentRange> {
    let rest = value.trim().strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse().ok()?),
    };
    if range.trim() == "*" {
        return Some(ContentRange { start: None, total });
    }
    let (start, _end) = range.split_once('-')?;
    Some(ContentRange {
        start: Some(start.trim().parse().ok()?),
        total,
    })
}

fn range_header(range: ByteRange) -> Option<String> {
    match range.end {
        None if range.start == 0 => None,
        None => Some(format!("bytes={}-", range.start)),
        Some(end) => Some(format!("bytes={}-{}", range.start, end - 1)),
    }
}

fn transport_error(e: &reqwest::Error) -> DownloadError {
    match e.status() {
        Some(status) => DownloadError::network_with_status(e.to_string(), status.as_u16()),
        None => DownloadError::network(e.to_string()),
    }
}

fn status_error(status: StatusCode, uri: &str) -> DownloadError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        DownloadError::network_with_status(format!("HTTP {status} for {uri}"), status.as_u16())
    } else {
        DownloadError::other(format!("HTTP {status} for {uri}"))
    }
}

/// [`ResourceFetcherPort`] over HTTP(S) using `Range` requests.
///
/// Servers that ignore `Range` and answer 200 are handled by discarding the
/// prefix before the requested start.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a default client.
    pub fn new() -> Result<Self, DownloadError> {
        let client = Client::builder()
            .user_agent(concat!("mediadl/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DownloadError::other(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub const fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcherPort for HttpFetcher {
    async fn fetch(&self, uri: &str, range: ByteRange) -> Result<FetchedResource, DownloadError> {
        if range.is_empty() {
            return Ok(FetchedResource {
                total_length: None,
                body: stream::empty().boxed(),
            });
        }

        let mut request = self.client.get(uri);
        if let Some(value) = range_header(range) {
            request = request.header(RANGE, value);
        }
        tracing::debug!(uri, start = range.start, end = ?range.end, "HTTP range request");
        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();

        let content_range = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);

        let (total_length, skip) = match status {
            StatusCode::PARTIAL_CONTENT => {
                let content_range = content_range
                    .ok_or_else(|| DownloadError::invalid_range("206 without Content-Range"))?;
                if content_range.start != Some(range.start) {
                    return Err(DownloadError::invalid_range(format!(
                        "requested offset {}, server sent {:?}",
                        range.start, content_range.start
                    )));
                }
                (content_range.total, 0)
            }
            StatusCode::OK => (response.content_length(), range.start),
            StatusCode::RANGE_NOT_SATISFIABLE => {
                return Ok(FetchedResource {
                    total_length: content_range.and_then(|c| c.total),
                    body: stream::empty().boxed(),
                });
            }
            other => return Err(status_error(other, uri)),
        };

        if skip > 0 {
            tracing::debug!(uri, skip, "Server ignored Range, discarding prefix");
        }
        let mut remaining = skip;
        let body = response
            .bytes_stream()
            .map_err(|e| transport_error(&e))
            .map_ok(move |mut chunk| {
                if remaining > 0 {
                    let cut = usize::try_from(remaining)
                        .unwrap_or(usize::MAX)
                        .min(chunk.len());
                    remaining -= cut as u64;
                    chunk = chunk.slice(cut..);
                }
                chunk
            })
            .try_filter(|chunk| ready(!chunk.is_empty()))
            .boxed();

        Ok(FetchedResource { total_length, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_content_range() {
        assert_eq!(
            parse_content_range("bytes 0-99/1000"),
            Some(ContentRange {
                start: Some(0),
                total: Some(1000)
            })
        );
        assert_eq!(
            parse_content_range("bytes 5-9/*"),
            Some(ContentRange {
                start: Some(5),
                total: None
            })
        );
        assert_eq!(
            parse_content_range("bytes */42"),
            Some(ContentRange {
                start: None,
                total: Some(42)
            })
        );
        assert_eq!(parse_content_range("items 0-1/2"), None);
    }

    #[test]
    fn test_range_header() {
        assert_eq!(range_header(ByteRange::from(0)), None);
        assert_eq!(range_header(ByteRange::from(10)).as_deref(), Some("bytes=10-"));
        assert_eq!(
            range_header(ByteRange::bounded(10, 20)).as_deref(),
            Some("bytes=10-19")
        );
    }

    /// Serve one canned HTTP response and return the base URL.
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{addr}/file")
    }

    async fn body_of(resource: FetchedResource) -> Vec<u8> {
        let chunks: Vec<_> = resource.body.try_collect().await.unwrap();
        chunks.iter().flat_map(|c| c.iter().copied()).collect()
    }

    #[tokio::test]
    async fn test_partial_content() {
        let url = serve_once(
            "HTTP/1.1 206 Partial Content\r\nContent-Range: bytes 2-5/10\r\nContent-Length: 4\r\nConnection: close\r\n\r\ncdef",
        )
        .await;
        let fetcher = HttpFetcher::new().unwrap();
        let resource = fetcher.fetch(&url, ByteRange::bounded(2, 6)).await.unwrap();
        assert_eq!(resource.total_length, Some(10));
        assert_eq!(body_of(resource).await, b"cdef");
    }

    #[tokio::test]
    async fn test_full_response_skips_prefix() {
        let url = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 10\r\nConnection: close\r\n\r\nabcdefghij",
        )
        .await;
        let fetcher = HttpFetcher::new().unwrap();
        let resource = fetcher.fetch(&url, ByteRange::from(4)).await.unwrap();
        assert_eq!(resource.total_length, Some(10));
        assert_eq!(body_of(resource).await, b"efghij");
    }

    #[tokio::test]
    async fn test_server_error_is_recoverable() {
        let url = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&url, ByteRange::from(0)).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(
            err,
            DownloadError::Network {
                status_code: Some(503),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_not_found_is_not_recoverable() {
        let url = serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await;
        let fetcher = HttpFetcher::new().unwrap();
        let err = fetcher.fetch(&url, ByteRange::from(0)).await.unwrap_err();
        assert!(!err.is_recoverable());
    }
}
