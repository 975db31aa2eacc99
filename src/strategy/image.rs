//! In-memory image fetch.
//!
//! The payload is buffered fully before being handed back; decoding a
//! stream directly risks truncated images when the connection drops
//! mid-body. Bitmap decoding itself is a caller concern; the strategy
//! returns raw bytes plus the advertised mime type.

use async_trait::async_trait;
use reqwest::Response;
use url::Url;

use super::{AttemptContext, RequestStrategy};
use crate::error::FetchError;
use crate::filename::response_mime;

/// A fully buffered image payload.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    /// Raw image bytes.
    pub bytes: Vec<u8>,
    /// Mime type from the response, when advertised.
    pub content_type: Option<String>,
}

/// GET strategy producing an [`ImagePayload`].
#[derive(Debug)]
pub struct GetImage {
    url: String,
}

impl GetImage {
    /// Creates an image fetch for the given URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RequestStrategy for GetImage {
    type Output = ImagePayload;

    fn request_url(&self) -> Result<Url, FetchError> {
        Url::parse(&self.url).map_err(|_| FetchError::invalid_url(&self.url))
    }

    async fn extract(
        &mut self,
        response: Response,
        attempt: &AttemptContext,
    ) -> Result<ImagePayload, FetchError> {
        let content_type = response_mime(response.headers());
        let bytes = response
            .bytes()
            .await
            .map_err(|error| FetchError::from_transport(&attempt.url, error))?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(ImagePayload {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
