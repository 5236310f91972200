//! PDF download with URL, size, and timeout policy.
//!
//! The fetcher validates the URL before touching the network, enforces a
//! per-request timeout and a download size ceiling, and maps every failure
//! mode to [`FetchError`]. It never retries; retry policy belongs to the
//! caller.

use reqwest::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while downloading a PDF.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The supplied string is not a fetchable URL.
    #[error("invalid document URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL string.
        url: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The HTTP layer failed before a response arrived (includes timeouts).
    #[error("request for '{url}' failed: {source}")]
    Request {
        /// Target document URL.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("unexpected status {status} fetching '{url}'")]
    UnexpectedStatus {
        /// Target document URL.
        url: String,
        /// HTTP status returned by the server.
        status: StatusCode,
    },
    /// The response body exceeds the configured download ceiling.
    #[error("document at '{url}' exceeds the {limit}-byte download ceiling")]
    TooManyBytes {
        /// Target document URL.
        url: String,
        /// Configured ceiling in bytes.
        limit: usize,
    },
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Downloads raw PDF bytes from a URL.
pub struct PdfFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl PdfFetcher {
    /// Build a fetcher with the given request timeout and size ceiling.
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent("pagescout/0.1")
            .timeout(timeout)
            .build()
            .map_err(FetchError::Client)?;
        Ok(Self { client, max_bytes })
    }

    /// Download the document at `url`, returning its raw bytes.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|err| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::UnexpectedStatus {
                url: url.to_string(),
                status,
            });
        }

        if let Some(declared) = response.content_length()
            && declared as usize > self.max_bytes
        {
            return Err(FetchError::TooManyBytes {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|source| FetchError::Request {
                url: url.to_string(),
                source,
            })?;

        if bytes.len() > self.max_bytes {
            return Err(FetchError::TooManyBytes {
                url: url.to_string(),
                limit: self.max_bytes,
            });
        }

        tracing::debug!(url, bytes = bytes.len(), "Fetched document");
        Ok(bytes.to_vec())
    }
}
