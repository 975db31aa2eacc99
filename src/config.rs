//! Engine configuration.
//!
//! All tunables the executor needs are captured here and read once at
//! construction time. Persisted configuration storage is a caller concern;
//! this module only defines the in-memory shape.

use std::time::Duration;

use url::Url;

/// Default maximum retry attempts per logical request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default bound on Location-header hops within one attempt.
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default minimum interval between requests to the rate-limited site.
pub const DEFAULT_MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);

/// Default User-Agent, matching what the sites' own client software sends.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows; U; Windows NT 5.1; en-US; rv:1.8.1.12) \
    Gecko/20080201 Firefox/2.0.0.12";

/// Fingerprint of the anti-automation challenge page.
///
/// A 200/206 response from `host` whose content type and content length both
/// match is classified as a soft block instead of a success. The byte length
/// is deliberately configuration, not a hardcoded constant: the signature is
/// brittle by construction and may need updating without a code change.
#[derive(Debug, Clone)]
pub struct BlockSignature {
    /// Host the signature applies to.
    pub host: String,
    /// Exact mime type of the challenge payload.
    pub content_type: String,
    /// Exact byte length of the challenge payload.
    pub content_length: u64,
}

impl BlockSignature {
    /// The mime type the known challenge page is served with.
    pub const CHALLENGE_MIME: &'static str = "image/gif";

    /// The byte length of the known single-pixel challenge payload.
    pub const CHALLENGE_LENGTH: u64 = 9615;

    /// Builds the known challenge fingerprint for the given host.
    #[must_use]
    pub fn for_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            content_type: Self::CHALLENGE_MIME.to_string(),
            content_length: Self::CHALLENGE_LENGTH,
        }
    }
}

/// Configuration inputs for [`RequestExecutor`](crate::RequestExecutor).
///
/// Read at executor construction time, not re-read mid-request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum retry attempts per logical request (at least 1).
    pub max_retries: u32,
    /// Maximum Location-header hops within one attempt.
    pub max_redirects: u32,
    /// Transport connect timeout.
    pub connect_timeout: Duration,
    /// Transport read timeout.
    pub read_timeout: Duration,
    /// Minimum wall-clock interval between requests to rate-limited hosts.
    pub min_request_interval: Duration,
    /// Hosts subject to the shared minimum-interval throttle. Session hooks
    /// are attached for these hosts as well.
    pub rate_limited_hosts: Vec<String>,
    /// Soft-block fingerprint, when the target site is known to serve one.
    pub block_signature: Option<BlockSignature>,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            min_request_interval: DEFAULT_MIN_REQUEST_INTERVAL,
            rate_limited_hosts: Vec::new(),
            block_signature: None,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl EngineConfig {
    /// Whether the URL targets a host under the shared throttle.
    #[must_use]
    pub fn is_rate_limited(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        self.rate_limited_hosts
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(host))
    }
}
