use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::{parse_feed, ParsedFeed};
use crate::scraper::FailureKind;

/// Default bound on one fetch, covering connect, headers and body
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on a feed document's size
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching and parsing one feed.
///
/// Every variant maps onto a [`FailureKind`] so callers can tell network
/// trouble from a broken document without matching on messages.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Parse(_) => FailureKind::Parse,
            FetchError::Network(_)
            | FetchError::HttpStatus(_)
            | FetchError::Timeout
            | FetchError::ResponseTooLarge
            | FetchError::IncompleteResponse { .. } => FailureKind::Network,
        }
    }
}

/// Retrieves feed documents over HTTP and hands them to the parser.
///
/// Cheap to clone: the underlying `reqwest::Client` is reference counted, so
/// every worker in a scrape cycle shares one connection pool.
#[derive(Clone, Debug)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_size: usize,
}

impl FeedFetcher {
    /// Build a fetcher with its own HTTP client.
    pub fn new(timeout: Duration, max_size: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("rssagg/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, timeout, max_size))
    }

    /// Build a fetcher around an existing client.
    pub fn with_client(client: reqwest::Client, timeout: Duration, max_size: usize) -> Self {
        Self {
            client,
            timeout,
            max_size,
        }
    }

    /// Fetch `url` and parse the body.
    ///
    /// The whole exchange, body included, is bounded by the fetcher's
    /// timeout. There are no retries: a failed feed waits for its next turn.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection or TLS errors
    /// - [`FetchError::Timeout`] - The exchange exceeded the timeout
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded the size limit
    /// - [`FetchError::IncompleteResponse`] - Body shorter than Content-Length
    /// - [`FetchError::Parse`] - Body is not RSS/Atom
    pub async fn fetch(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let bytes = tokio::time::timeout(self.timeout, self.download(url))
            .await
            .map_err(|_| FetchError::Timeout)??;

        parse_feed(&bytes, url).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(map_reqwest)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_size).await
    }
}

fn map_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
