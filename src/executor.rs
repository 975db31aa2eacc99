//! The retry/redirect/classification state machine.
//!
//! [`RequestExecutor`] drives a [`RequestStrategy`] through one or more
//! physical connections until success, a terminal error, or retry
//! exhaustion. Automatic redirect following is disabled on the transport;
//! redirects are a manual inner loop so the engine controls exactly what is
//! re-sent on each hop.
//!
//! An executor is scoped to one logical request at a time: it carries the
//! persisted last-redirect URL and last error across attempts. Callers
//! needing concurrency create one executor per in-flight request; only the
//! [`RateLimiter`](crate::RateLimiter) and
//! [`ProxyPool`](crate::ProxyPool) are shared.

use std::sync::Arc;

use reqwest::header::{HeaderMap, LOCATION};
use reqwest::{Client, Response, redirect};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::EngineConfig;
use crate::error::FetchError;
use crate::rate_limit::RateLimiter;
use crate::session::SessionHooks;
use crate::strategy::{AttemptContext, RequestStrategy};

/// Executes request strategies with retries, manual redirects, rate
/// limiting, and soft-block classification.
pub struct RequestExecutor {
    client: Client,
    config: Arc<EngineConfig>,
    limiter: Option<Arc<RateLimiter>>,
    session: Option<Arc<dyn SessionHooks>>,
    session_mode: Option<String>,
    last_redirect: Option<Url>,
    last_error: Option<String>,
}

impl RequestExecutor {
    /// Creates an executor from configuration.
    ///
    /// Configuration is read here, once; later changes to the caller's
    /// persisted settings do not affect an in-flight executor.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .user_agent(config.user_agent.clone())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            config,
            limiter: None,
            session: None,
            session_mode: None,
            last_redirect: None,
            last_error: None,
        }
    }

    /// Shares the process-wide rate limiter with this executor.
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Registers the external session/cookie collaborator.
    #[must_use]
    pub fn with_session(mut self, session: Arc<dyn SessionHooks>) -> Self {
        self.session = Some(session);
        self
    }

    /// Sets the presentation mode forwarded to the session collaborator.
    pub fn set_session_mode(&mut self, mode: Option<String>) {
        self.session_mode = mode;
    }

    /// The last redirect target observed, if any.
    ///
    /// Retries resume from here rather than the strategy's canonical URL.
    #[must_use]
    pub fn last_url(&self) -> Option<&Url> {
        self.last_redirect.as_ref()
    }

    /// Human-readable message of the last error observed.
    #[must_use]
    pub fn last_error_message(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Clears per-request state so the executor can serve a new logical
    /// request.
    pub fn reset(&mut self) {
        self.last_redirect = None;
        self.last_error = None;
    }

    /// Drives the strategy to completion.
    ///
    /// Every error kind except cancellation is retried up to the configured
    /// attempt budget; cancellation aborts immediately. After the final
    /// failure the strategy's cleanup hook runs before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the last observed [`FetchError`] when all attempts are
    /// exhausted, or [`FetchError::Cancelled`] on caller-requested stop.
    #[instrument(skip_all, fields(max_retries = self.config.max_retries))]
    pub async fn execute<S: RequestStrategy>(
        &mut self,
        strategy: &mut S,
    ) -> Result<S::Output, FetchError> {
        let attempts = self.config.max_retries.max(1);
        let mut attempt = 0;
        loop {
            match self.run_attempt(strategy).await {
                Ok(output) => return Ok(output),
                Err(error) => {
                    attempt += 1;
                    self.last_error = Some(error.to_string());
                    if error.is_cancellation() || attempt >= attempts {
                        warn!(attempt, error = %error, "request failed");
                        strategy.on_failure(&error).await;
                        return Err(error);
                    }
                    debug!(attempt, error = %error, "attempt failed, retrying");
                }
            }
        }
    }

    /// One retry attempt: rate-limit gate, then the bounded redirect loop.
    async fn run_attempt<S: RequestStrategy>(
        &mut self,
        strategy: &mut S,
    ) -> Result<S::Output, FetchError> {
        // Resume from the last redirect target when one is known.
        let mut url = match &self.last_redirect {
            Some(resumed) => resumed.clone(),
            None => strategy.request_url()?,
        };

        let rate_limited = self.config.is_rate_limited(&url);
        if rate_limited && let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        debug!(url = %url, "request");
        // A retry resuming from a redirect target has already satisfied any
        // redirect requirement; the flag must survive the new attempt.
        let mut redirected = self.last_redirect.is_some();
        let mut first = true;
        for _hop in 0..self.config.max_redirects {
            if let Some(token) = strategy.cancel_token()
                && token.is_cancelled()
            {
                return Err(FetchError::Cancelled);
            }

            // The strategy customizes only the first connection of each
            // attempt; redirect hops are plain GETs with standard headers.
            let mut builder = if first {
                first = false;
                strategy.customize(self.client.request(strategy.method(), url.clone()))?
            } else {
                self.client.get(url.clone())
            };

            if rate_limited && let Some(session) = &self.session {
                let mut headers = HeaderMap::new();
                session.attach(&mut headers, self.session_mode.as_deref());
                builder = builder.headers(headers);
            }

            let response = builder
                .send()
                .await
                .map_err(|error| FetchError::from_transport(&url, error))?;
            let status = response.status().as_u16();

            match status {
                200 | 206 => {
                    self.check_block_signature(&url, &response)?;
                    if rate_limited && let Some(session) = &self.session {
                        session.capture(&response);
                    }
                    let attempt = AttemptContext {
                        url: url.clone(),
                        redirected,
                    };
                    return strategy.extract(response, &attempt).await;
                }
                301 | 302 | 303 | 307 => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .ok_or_else(|| FetchError::bad_status(url.as_str(), status))?;
                    let next = url
                        .join(location)
                        .map_err(|_| FetchError::invalid_url(location))?;
                    debug!(location = %next, "following redirect");
                    self.last_redirect = Some(next.clone());
                    url = next;
                    redirected = true;
                }
                _ => return Err(self.classify_failure(strategy, response, &url, status).await),
            }
        }

        Err(FetchError::TooManyRedirects {
            limit: self.config.max_redirects,
        })
    }

    /// Rejects responses matching the anti-automation block fingerprint.
    ///
    /// Runs before session capture and before the strategy sees the
    /// response: a challenge page disguised as a 200 must never be treated
    /// as a success.
    fn check_block_signature(&self, url: &Url, response: &Response) -> Result<(), FetchError> {
        let Some(signature) = &self.config.block_signature else {
            return Ok(());
        };
        if url.host_str() != Some(signature.host.as_str()) {
            return Ok(());
        }
        let mime = crate::filename::response_mime(response.headers());
        let length = crate::transfer::declared_content_length(response.headers());
        if mime.as_deref() == Some(signature.content_type.as_str())
            && length == Some(signature.content_length)
        {
            warn!(url = %url, "soft block signature matched");
            return Err(FetchError::SoftBlock);
        }
        Ok(())
    }

    /// Turns a non-success, non-redirect response into an error.
    ///
    /// Text-reading strategies may surface a plain-text body (one with no
    /// HTML marker) as the error message; everything else becomes a bare
    /// bad-status error.
    async fn classify_failure<S: RequestStrategy>(
        &self,
        strategy: &S,
        response: Response,
        url: &Url,
        status: u16,
    ) -> FetchError {
        if strategy.reads_text_errors()
            && let Ok(body) = response.text().await
            && !body.is_empty()
            && !body.contains('<')
        {
            return FetchError::ServerMessage { message: body };
        }
        FetchError::bad_status(url.as_str(), status)
    }
}
