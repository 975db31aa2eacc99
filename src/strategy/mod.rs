//! Request strategies: what to fetch and how to interpret it.
//!
//! Each variant supplies URL construction, a pre-connect customizer
//! (method, headers, body), a post-connect extractor, and an optional
//! failure hook. The [`RequestExecutor`](crate::RequestExecutor) drives any
//! strategy through its retry/redirect state machine; strategies never talk
//! to the network directly.

mod download;
mod image;
mod multipart;
mod text;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use crate::error::FetchError;
use crate::listener::CancelToken;

pub use download::{Download, DownloadOptions};
pub use image::{GetImage, ImagePayload};
pub use multipart::{FormPart, MULTIPART_BOUNDARY, PostMultipart};
pub use text::{AccessProbe, GetText, PostForm, PostJson};

/// Per-attempt facts the executor shares with the extractor.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// The URL the successful response came from (after redirects).
    pub url: Url,
    /// Whether at least one redirect occurred during this attempt.
    pub redirected: bool,
}

/// Capability set implemented by every request variant.
///
/// Methods take `&mut self` because several variants carry per-request
/// mutable state (negotiated filenames, temp-file paths). A strategy value
/// is owned by one logical request; create a fresh one per request.
#[async_trait]
pub trait RequestStrategy: Send {
    /// What a successful execution produces.
    type Output: Send;

    /// The canonical URL for the first attempt.
    ///
    /// Retries may start elsewhere: the executor persists the last redirect
    /// target across attempts and prefers it over this URL.
    fn request_url(&self) -> Result<Url, FetchError>;

    /// HTTP method for the initial request of each attempt.
    fn method(&self) -> Method {
        Method::GET
    }

    /// Applies headers and body before connecting.
    ///
    /// Invoked exactly once per retry attempt, not once per redirect, so a
    /// request body is never re-sent on a hop.
    fn customize(&mut self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        Ok(builder)
    }

    /// Extracts the result from a 200/206 response.
    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<Self::Output, FetchError>;

    /// Whether non-success response bodies may carry a plain-text error
    /// message worth surfacing instead of a bare status code.
    fn reads_text_errors(&self) -> bool {
        false
    }

    /// Cooperative cancellation token, polled by the executor before each
    /// redirect hop.
    fn cancel_token(&self) -> Option<&CancelToken> {
        None
    }

    /// Cleanup hook, invoked once after the retry budget is exhausted (or
    /// immediately on cancellation). Not called on success.
    async fn on_failure(&mut self, error: &FetchError) {
        let _ = error;
    }
}
