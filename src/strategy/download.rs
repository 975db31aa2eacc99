//! Streaming download strategies.
//!
//! The base [`Download`] streams a body to disk through
//! [`DownloadContext`](crate::transfer::DownloadContext). Sub-variants are
//! expressed by configuration rather than an inheritance chain: the gallery
//! image variant adds an extension allowlist, and the origin variant
//! additionally refuses to run unless a redirect occurred.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::{Method, RequestBuilder, Response};
use serde_json::json;
use url::Url;

use super::{AttemptContext, RequestStrategy};
use crate::error::FetchError;
use crate::filename::ExtensionPolicy;
use crate::listener::{CancelToken, TransferListener};
use crate::proxy::ProxyPool;
use crate::transfer::DownloadContext;

/// Caller-selected download behaviors.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownloadOptions {
    /// Allow the negotiated base name to replace the requested one.
    pub fix_name: bool,
    /// Allow the negotiated extension to replace the requested one.
    pub fix_extension: bool,
    /// Route the download through the proxy pool instead of connecting to
    /// the target directly.
    pub use_proxy: bool,
}

/// Streams a large payload to a file in the target directory.
///
/// Successful execution yields the final file path. Direct downloads send
/// `Range: bytes=0-`; proxied downloads POST the target URL to the next
/// proxy endpoint from the pool.
pub struct Download {
    url: String,
    use_proxy: bool,
    require_redirect: bool,
    proxies: Option<Arc<ProxyPool>>,
    context: DownloadContext,
}

impl Download {
    /// Creates a download of `url` into `dir` under `filename`.
    pub fn new(url: impl Into<String>, dir: impl AsRef<Path>, filename: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            use_proxy: false,
            require_redirect: false,
            proxies: None,
            context: DownloadContext::new(dir.as_ref(), filename),
        }
    }

    /// Gallery image variant: filename fixing constrained to the raster
    /// image allowlist, with jpg as the fallback extension.
    pub fn gallery_image(
        url: impl Into<String>,
        dir: impl AsRef<Path>,
        filename: impl Into<String>,
    ) -> Self {
        let mut download = Self::new(url, dir, filename);
        download.context.extension_policy = Some(ExtensionPolicy::gallery_images());
        download
    }

    /// Origin-quality gallery image variant.
    ///
    /// Origin fetches must arrive via the site's redirecting bandwidth
    /// accounting; a direct-origin response is refused with a quota error.
    pub fn origin_gallery_image(
        url: impl Into<String>,
        dir: impl AsRef<Path>,
        filename: impl Into<String>,
    ) -> Self {
        let mut download = Self::gallery_image(url, dir, filename);
        download.require_redirect = true;
        download
    }

    /// Applies download options.
    #[must_use]
    pub fn with_options(mut self, options: DownloadOptions) -> Self {
        self.context.fix_name = options.fix_name;
        self.context.fix_extension = options.fix_extension;
        self.use_proxy = options.use_proxy;
        self
    }

    /// Registers the progress listener for this download.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn TransferListener>) -> Self {
        self.context.listener = Some(listener);
        self
    }

    /// Shares a cancellation token with the caller.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.context.control = Some(token);
        self
    }

    /// Supplies the proxy pool used when `use_proxy` is set.
    #[must_use]
    pub fn with_proxies(mut self, proxies: Arc<ProxyPool>) -> Self {
        self.proxies = Some(proxies);
        self
    }

    /// The current filename (possibly updated by negotiation).
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.context.filename
    }
}

#[async_trait]
impl RequestStrategy for Download {
    type Output = PathBuf;

    fn request_url(&self) -> Result<Url, FetchError> {
        if self.use_proxy {
            let endpoint = self
                .proxies
                .as_ref()
                .and_then(|pool| pool.next())
                .ok_or_else(|| FetchError::invalid_url("no proxy endpoint available"))?;
            return Url::parse(&endpoint).map_err(|_| FetchError::invalid_url(endpoint));
        }
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    fn method(&self) -> Method {
        if self.use_proxy {
            Method::POST
        } else {
            Method::GET
        }
    }

    fn customize(&mut self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        if self.context.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        if let Some(listener) = &self.context.listener {
            listener.on_connect_started();
        }
        if self.use_proxy {
            // The proxy endpoint expects the target URL as a JSON body.
            Ok(builder.body(json!({ "url": self.url }).to_string()))
        } else {
            Ok(builder.header(RANGE, "bytes=0-"))
        }
    }

    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<PathBuf, FetchError> {
        if self.require_redirect && !attempt.redirected {
            return Err(FetchError::QuotaExceeded);
        }
        self.context.transfer(response, &attempt.url).await
    }

    fn cancel_token(&self) -> Option<&CancelToken> {
        self.context.control.as_ref()
    }

    async fn on_failure(&mut self, error: &FetchError) {
        self.context.cleanup_after(error).await;
    }
}
