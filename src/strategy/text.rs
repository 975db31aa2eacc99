//! Text-producing strategies: plain GET, form POST, JSON POST, and the
//! HEAD-method access probe.
//!
//! Bodies are decoded with transparent gzip decompression and the charset
//! named by the content-type `charset=` parameter, defaulting to UTF-8,
//! both handled by reqwest's body decoding.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use super::{AttemptContext, RequestStrategy};
use crate::error::FetchError;

pub(crate) async fn decode_text(url: &Url, response: Response) -> Result<String, FetchError> {
    response
        .text()
        .await
        .map_err(|error| FetchError::from_transport(url, error))
}

/// Plain GET returning the decoded response body.
#[derive(Debug)]
pub struct GetText {
    url: String,
}

impl GetText {
    /// Creates a GET strategy for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RequestStrategy for GetText {
    type Output = String;

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<String, FetchError> {
        decode_text(&attempt.url, response).await
    }

    fn reads_text_errors(&self) -> bool {
        true
    }
}

/// POST with a `application/x-www-form-urlencoded` body.
///
/// Pairs are serialized in caller-supplied order.
#[derive(Debug)]
pub struct PostForm {
    url: String,
    fields: Vec<(String, String)>,
}

impl PostForm {
    /// Creates a form POST strategy.
    pub fn new(url: impl Into<String>, fields: Vec<(String, String)>) -> Self {
        Self {
            url: url.into(),
            fields,
        }
    }
}

#[async_trait]
impl RequestStrategy for PostForm {
    type Output = String;

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    fn method(&self) -> Method {
        Method::POST
    }

    fn customize(&mut self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        // Slice-of-pairs serialization keeps the caller's ordering.
        Ok(builder.form(&self.fields))
    }

    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<String, FetchError> {
        decode_text(&attempt.url, response).await
    }

    fn reads_text_errors(&self) -> bool {
        true
    }
}

/// POST with a compact JSON body.
#[derive(Debug)]
pub struct PostJson {
    url: String,
    body: serde_json::Value,
}

impl PostJson {
    /// Creates a JSON POST strategy.
    pub fn new(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            url: url.into(),
            body,
        }
    }
}

#[async_trait]
impl RequestStrategy for PostJson {
    type Output = String;

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    fn method(&self) -> Method {
        Method::POST
    }

    fn customize(&mut self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        Ok(builder.json(&self.body))
    }

    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<String, FetchError> {
        decode_text(&attempt.url, response).await
    }

    fn reads_text_errors(&self) -> bool {
        true
    }
}

/// HEAD-method probe against the restricted host.
///
/// Produces no body; its value is that the executor's soft-block check runs
/// against the response headers, so a challenge page surfaces as
/// [`FetchError::SoftBlock`] while a clean response yields `Ok(())`.
#[derive(Debug)]
pub struct AccessProbe {
    url: String,
}

impl AccessProbe {
    /// Creates a probe for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RequestStrategy for AccessProbe {
    type Output = ();

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    fn method(&self) -> Method {
        Method::HEAD
    }

    async fn extract(
        &mut self,
        _response: Response,
        _attempt: &AttemptContext,
    ) -> Result<(), FetchError> {
        Ok(())
    }
}
