//! Multipart form POST with a fixed boundary token.
//!
//! The body is assembled by hand rather than through reqwest's multipart
//! support: the wire format is pinned. The boundary is a fixed token, each
//! part's property block is rendered in insertion order and terminated by a
//! blank line, and parts are emitted in caller-supplied order with a
//! boundary-with-dashes terminator at the end.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use super::text::decode_text;
use super::{AttemptContext, RequestStrategy};
use crate::error::FetchError;

/// Boundary token used for every multipart request.
pub const MULTIPART_BOUNDARY: &str = "----WebKitFormBoundary7eDB0hDQ91s22Tkf";

#[derive(Debug, Clone)]
enum PartPayload {
    Text(String),
    Bytes(Vec<u8>),
}

/// One part of a multipart body: a property block plus a payload.
///
/// Properties are raw header lines (`Content-Disposition`, `Content-Type`,
/// ...) rendered in insertion order; setting an existing key replaces its
/// value in place.
#[derive(Debug, Clone)]
pub struct FormPart {
    properties: Vec<(String, String)>,
    payload: PartPayload,
}

impl FormPart {
    /// Creates a text part.
    pub fn text(value: impl Into<String>) -> Self {
        Self {
            properties: Vec::new(),
            payload: PartPayload::Text(value.into()),
        }
    }

    /// Creates a binary part (file contents, encoded images, ...).
    #[must_use]
    pub fn bytes(value: Vec<u8>) -> Self {
        Self {
            properties: Vec::new(),
            payload: PartPayload::Bytes(value),
        }
    }

    /// Sets a property line, preserving first-insertion order.
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        if let Some(entry) = self.properties.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.properties.push((key, value));
        }
    }

    /// Removes a property line.
    pub fn clear_property(&mut self, key: &str) {
        self.properties.retain(|(k, _)| k != key);
    }

    /// Builder-style [`set_property`](Self::set_property).
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_property(key, value);
        self
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for (key, value) in &self.properties {
            out.extend_from_slice(key.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        match &self.payload {
            PartPayload::Text(text) => out.extend_from_slice(text.as_bytes()),
            PartPayload::Bytes(bytes) => out.extend_from_slice(bytes),
        }
        out.extend_from_slice(b"\r\n");
    }
}

pub(crate) fn encode_multipart(parts: &[FormPart]) -> Vec<u8> {
    let mut out = Vec::new();
    for part in parts {
        out.extend_from_slice(b"--");
        out.extend_from_slice(MULTIPART_BOUNDARY.as_bytes());
        out.extend_from_slice(b"\r\n");
        part.write_to(&mut out);
    }
    out.extend_from_slice(b"--");
    out.extend_from_slice(MULTIPART_BOUNDARY.as_bytes());
    out.extend_from_slice(b"--");
    out
}

/// POST with a `multipart/form-data` body.
#[derive(Debug)]
pub struct PostMultipart {
    url: String,
    parts: Vec<FormPart>,
}

impl PostMultipart {
    /// Creates a multipart POST; parts are emitted in the given order.
    pub fn new(url: impl Into<String>, parts: Vec<FormPart>) -> Self {
        Self {
            url: url.into(),
            parts,
        }
    }
}

#[async_trait]
impl RequestStrategy for PostMultipart {
    type Output = String;

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    fn method(&self) -> Method {
        Method::POST
    }

    fn customize(&mut self, builder: RequestBuilder) -> Result<RequestBuilder, FetchError> {
        Ok(builder
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"),
            )
            .body(encode_multipart(&self.parts)))
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
