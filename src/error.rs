//! Error types for the fetch engine.
//!
//! Every failure the engine can observe maps to one [`FetchError`] variant,
//! so callers get a single human-readable message per kind and can
//! special-case the ones that matter (soft blocks, cancellation).

use std::path::PathBuf;

use thiserror::Error;
use url::Url;

/// Errors that can occur while executing a request or streaming a download.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The connection could not be established within the connect timeout.
    #[error("connect timeout for {url}")]
    ConnectTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// The response did not arrive within the read timeout.
    #[error("read timeout for {url}")]
    ReadTimeout {
        /// The URL that timed out.
        url: String,
    },

    /// DNS resolution failed for the target host.
    #[error("unknown host: {host}")]
    UnknownHost {
        /// The host that failed to resolve.
        host: String,
    },

    /// Transport-level error (connection reset, TLS failure, etc.)
    #[error("socket error for {url}: {source}")]
    Socket {
        /// The URL that failed.
        url: String,
        /// The underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP error response that carried no usable plain-text message.
    #[error("unexpected response code {status} from {url}")]
    BadStatus {
        /// The URL that returned the error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Plain-text error message extracted from a non-success response body.
    #[error("{message}")]
    ServerMessage {
        /// The message the server returned.
        message: String,
    },

    /// The redirect bound was exceeded within a single attempt.
    #[error("too many redirects (limit {limit})")]
    TooManyRedirects {
        /// The configured redirect bound.
        limit: u32,
    },

    /// A 200-status response matched the anti-automation block signature.
    ///
    /// The message is fixed and distinctive so callers can special-case it,
    /// e.g. to prompt a challenge-solving flow.
    #[error("blocked: the site returned an anti-automation challenge page")]
    SoftBlock,

    /// The response body was empty or could not be decoded.
    #[error("response body was empty or undecodable")]
    EmptyBody,

    /// The received byte count did not match the declared content length.
    #[error("incomplete transfer: expected {expected} bytes, received {received}")]
    Incomplete {
        /// Bytes the server declared.
        expected: u64,
        /// Bytes actually received.
        received: u64,
    },

    /// The restricted origin path was taken without the required redirect.
    #[error("direct origin fetch refused: bandwidth quota path")]
    QuotaExceeded,

    /// The caller requested cancellation via the shared token.
    #[error("cancelled by caller")]
    Cancelled,

    /// File system error while materializing a download.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a bad status error.
    pub fn bad_status(url: impl Into<String>, status: u16) -> Self {
        Self::BadStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an incomplete transfer error.
    pub fn incomplete(expected: u64, received: u64) -> Self {
        Self::Incomplete { expected, received }
    }

    /// Whether this error is a caller-requested cancellation.
    ///
    /// Cancellation is the only kind that aborts the retry loop immediately.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classifies a reqwest transport error against the URL it hit.
    pub(crate) fn from_transport(url: &Url, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            if source.is_connect() {
                return Self::ConnectTimeout {
                    url: url.to_string(),
                };
            }
            return Self::ReadTimeout {
                url: url.to_string(),
            };
        }
        if is_dns_failure(&source) {
            return Self::UnknownHost {
                host: url.host_str().unwrap_or_default().to_string(),
            };
        }
        Self::Socket {
            url: url.to_string(),
            source,
        }
    }
}

/// Walks the source chain looking for a DNS resolution failure.
///
/// reqwest does not expose DNS errors as a dedicated kind, so this inspects
/// the error text the resolver produces.
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut cause: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(error);
    while let Some(err) = cause {
        let text = err.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return true;
        }
        cause = err.source();
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_status_display_carries_code_and_url() {
        let error = FetchError::bad_status("https://example.com/g/123", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(
            msg.contains("https://example.com/g/123"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_incomplete_display_carries_both_counts() {
        let error = FetchError::incomplete(1000, 998);
        let msg = error.to_string();
        assert!(msg.contains("1000"), "Expected expected-count in: {msg}");
        assert!(msg.contains("998"), "Expected received-count in: {msg}");
    }

    #[test]
    fn test_soft_block_message_is_distinctive() {
        let msg = FetchError::SoftBlock.to_string();
        assert!(
            msg.contains("anti-automation"),
            "Soft block must be distinguishable from generic failures: {msg}"
        );
        assert_ne!(msg, FetchError::bad_status("https://x", 200).to_string());
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(FetchError::Cancelled.is_cancellation());
        assert!(!FetchError::SoftBlock.is_cancellation());
        assert!(!FetchError::incomplete(1, 0).is_cancellation());
    }

    #[test]
    fn test_io_display_carries_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = FetchError::io(PathBuf::from("/tmp/page_01.jpg.download"), io_error);
        assert!(error.to_string().contains("page_01.jpg.download"));
    }
}
