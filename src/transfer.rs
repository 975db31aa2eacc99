//! Streaming body-to-file transfer with atomic finalization.
//!
//! Used by the download strategy's extractor: resolves the content length
//! (including `Content-Range` recovery), negotiates the filename, streams
//! chunks to a suffix-tagged temp file with cancellation and progress
//! checks, verifies completeness, and renames the temp file over the final
//! name in one step. Every failure path deletes both the temp file and any
//! partially materialized final file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::Response;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, HeaderMap};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

use crate::error::FetchError;
use crate::filename::{ExtensionPolicy, negotiate_filename};
use crate::listener::{CancelToken, TransferListener, TransferStatus};

/// Suffix appended to the final name while the transfer is in flight.
pub(crate) const DOWNLOAD_SUFFIX: &str = ".download";

/// Per-download mutable state, created for one invocation and torn down on
/// success (temp file renamed) or failure (both files deleted).
pub(crate) struct DownloadContext {
    pub dir: PathBuf,
    pub filename: String,
    pub fix_name: bool,
    pub fix_extension: bool,
    pub extension_policy: Option<ExtensionPolicy>,
    pub control: Option<CancelToken>,
    pub listener: Option<Arc<dyn TransferListener>>,
    final_path: Option<PathBuf>,
    temp_path: Option<PathBuf>,
    received: u64,
}

impl DownloadContext {
    pub(crate) fn new(dir: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            filename: filename.into(),
            fix_name: false,
            fix_extension: false,
            extension_policy: None,
            control: None,
            listener: None,
            final_path: None,
            temp_path: None,
            received: 0,
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.control
            .as_ref()
            .is_some_and(CancelToken::is_cancelled)
    }

    fn notify(&self, f: impl FnOnce(&dyn TransferListener)) {
        if let Some(listener) = &self.listener {
            f(listener.as_ref());
        }
    }

    /// Streams the response body into the target directory.
    ///
    /// Returns the final path on success. On error the caller is expected
    /// to invoke [`cleanup_after`](Self::cleanup_after) once retries are
    /// exhausted.
    pub(crate) async fn transfer(
        &mut self,
        response: Response,
        url: &Url,
    ) -> Result<PathBuf, FetchError> {
        if self.is_cancelled() {
            return Err(FetchError::Cancelled);
        }

        let headers = response.headers().clone();
        if self.fix_name || self.fix_extension {
            let negotiated = negotiate_filename(
                &headers,
                &self.filename,
                self.fix_name,
                self.fix_extension,
                self.extension_policy.as_ref(),
            );
            if negotiated != self.filename {
                debug!(old = %self.filename, new = %negotiated, "negotiated filename");
                self.filename = negotiated;
                let name = self.filename.clone();
                self.notify(|l| l.on_filename_updated(&name));
            }
        }

        let total = declared_content_length(&headers);
        self.notify(|l| l.on_download_started(total));

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| FetchError::io(&self.dir, e))?;
        let final_path = self.dir.join(&self.filename);
        let temp_path = self.dir.join(format!("{}{DOWNLOAD_SUFFIX}", self.filename));
        self.final_path = Some(final_path.clone());
        self.temp_path = Some(temp_path.clone());

        self.received = 0;
        self.stream_to(&temp_path, response, url, total).await?;

        if let Some(expected) = total
            && self.received != expected
        {
            return Err(FetchError::incomplete(expected, self.received));
        }

        tokio::fs::rename(&temp_path, &final_path)
            .await
            .map_err(|e| FetchError::io(&final_path, e))?;

        info!(path = %final_path.display(), bytes = self.received, "download complete");
        self.notify(|l| l.on_completed(TransferStatus::Ok, None));
        Ok(final_path)
    }

    async fn stream_to(
        &mut self,
        temp_path: &Path,
        response: Response,
        url: &Url,
        total: Option<u64>,
    ) -> Result<(), FetchError> {
        let file = File::create(temp_path)
            .await
            .map_err(|e| FetchError::io(temp_path, e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();

        loop {
            // Cancellation is observed between chunks, never mid-chunk.
            if self.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            let Some(chunk) = stream.next().await else {
                break;
            };
            let chunk = chunk.map_err(|error| FetchError::from_transport(url, error))?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(temp_path, e))?;
            self.received += chunk.len() as u64;
            let received = self.received;
            self.notify(|l| l.on_progress(received, total));
        }

        writer
            .flush()
            .await
            .map_err(|e| FetchError::io(temp_path, e))
    }

    /// Deletes the temp file and any partially materialized final file,
    /// then reports the terminal status to the listener.
    pub(crate) async fn cleanup_after(&mut self, error: &FetchError) {
        if let Some(path) = self.temp_path.take() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        if let Some(path) = self.final_path.take() {
            let _ = tokio::fs::remove_file(&path).await;
        }
        let status = if error.is_cancellation() {
            TransferStatus::Cancelled
        } else {
            TransferStatus::Failed
        };
        let message = error.to_string();
        self.notify(|l| l.on_completed(status, Some(&message)));
    }
}

/// Resolves the declared content length from response headers.
///
/// Prefers `Content-Length`; when absent, recovers the total entity size
/// from `Content-Range`.
pub(crate) fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    if let Some(length) = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Some(length);
    }
    headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(total_from_content_range)
}

/// Recovers the total size from a `Content-Range: bytes X-Y/TOTAL` header.
///
/// Scans for the third run of consecutive digits and accumulates a decimal
/// integer from it, so a partial-content header still yields the full
/// entity size.
pub(crate) fn total_from_content_range(range: &str) -> Option<u64> {
    let mut total: u64 = 0;
    let mut runs = 0;
    let mut in_digits = false;
    let mut found = false;
    for ch in range.chars() {
        if ch.is_ascii_digit() {
            if !in_digits {
                in_digits = true;
                runs += 1;
            }
            if runs == 3 {
                total = total * 10 + u64::from(ch as u8 - b'0');
                found = true;
            }
        } else {
            in_digits = false;
        }
    }
    found.then_some(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn response_with(
        status: u16,
        headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> reqwest::Response {
        let mut builder = http::Response::builder().status(status);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        reqwest::Response::from(builder.body(body).unwrap())
    }

    fn test_url() -> Url {
        Url::parse("https://files.example/archive/page_01.jpg").unwrap()
    }

    #[test]
    fn test_content_range_total_parse() {
        assert_eq!(total_from_content_range("bytes 500-999/1234"), Some(1234));
        assert_eq!(total_from_content_range("bytes 0-0/1"), Some(1));
        assert_eq!(total_from_content_range("bytes 500-999/*"), None);
        assert_eq!(total_from_content_range(""), None);
    }

    #[test]
    fn test_declared_length_prefers_content_length() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, "42".parse().unwrap());
        headers.insert(CONTENT_RANGE, "bytes 0-41/100".parse().unwrap());
        assert_eq!(declared_content_length(&headers), Some(42));
    }

    #[test]
    fn test_declared_length_falls_back_to_content_range() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_RANGE, "bytes 500-999/1234".parse().unwrap());
        assert_eq!(declared_content_length(&headers), Some(1234));
    }

    #[tokio::test]
    async fn test_transfer_writes_file_and_removes_temp() {
        let dir = tempfile::tempdir().unwrap();
        let body = vec![7u8; 64];
        let response = response_with(200, &[("Content-Length", "64")], body.clone());

        let mut context = DownloadContext::new(dir.path(), "page_01.jpg");
        let path = context.transfer(response, &test_url()).await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert_eq!(path.file_name().unwrap(), "page_01.jpg");
        assert!(!dir.path().join("page_01.jpg.download").exists());
    }

    #[tokio::test]
    async fn test_short_body_yields_incomplete_and_cleanup_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let response = response_with(200, &[("Content-Length", "1000")], vec![0u8; 998]);

        let mut context = DownloadContext::new(dir.path(), "file.bin");
        let error = context.transfer(response, &test_url()).await.unwrap_err();
        assert!(
            matches!(
                error,
                FetchError::Incomplete {
                    expected: 1000,
                    received: 998
                }
            ),
            "got: {error:?}"
        );

        context.cleanup_after(&error).await;
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert!(entries.is_empty(), "leftover files: {entries:?}");
    }

    #[tokio::test]
    async fn test_partial_content_total_recovered_from_content_range() {
        let dir = tempfile::tempdir().unwrap();
        let response = response_with(
            206,
            &[("Content-Range", "bytes 0-97/98")],
            vec![1u8; 98],
        );

        let mut context = DownloadContext::new(dir.path(), "part.bin");
        let path = context.transfer(response, &test_url()).await.unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 98);
    }

    #[tokio::test]
    async fn test_cancel_before_start_raises_stop_error() {
        let dir = tempfile::tempdir().unwrap();
        let response = response_with(200, &[], vec![0u8; 8]);

        let token = CancelToken::new();
        token.cancel();
        let mut context = DownloadContext::new(dir.path(), "file.bin");
        context.control = Some(token);

        let error = context.transfer(response, &test_url()).await.unwrap_err();
        assert!(error.is_cancellation());
    }

    #[tokio::test]
    async fn test_filename_negotiation_from_disposition() {
        let dir = tempfile::tempdir().unwrap();
        let response = response_with(
            200,
            &[(
                "Content-Disposition",
                r#"attachment; filename="renamed.png""#,
            )],
            vec![2u8; 16],
        );

        let mut context = DownloadContext::new(dir.path(), "original.jpg");
        context.fix_name = true;
        context.fix_extension = true;
        let path = context.transfer(response, &test_url()).await.unwrap();
        assert_eq!(path.file_name().unwrap(), "renamed.png");
    }
}
