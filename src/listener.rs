//! Transfer progress callbacks and cooperative cancellation.
//!
//! The engine never assumes a presentation layer or a thread-affinity
//! runtime: results and progress are surfaced through [`TransferListener`]
//! and the caller decides how to marshal them onward.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Terminal status reported through [`TransferListener::on_completed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// The transfer finished and the file was finalized.
    Ok,
    /// The transfer failed after exhausting retries.
    Failed,
    /// The caller cancelled the transfer.
    Cancelled,
}

/// Optional per-request callbacks for download progress.
///
/// At most one listener is registered per logical request. All methods have
/// empty defaults so implementors override only what they need. Callbacks
/// run on the task driving the request.
pub trait TransferListener: Send + Sync {
    /// A connection attempt is about to start.
    fn on_connect_started(&self) {}

    /// Headers arrived and streaming is about to begin.
    /// `total` is `None` when no length information is available.
    fn on_download_started(&self, total: Option<u64>) {
        let _ = total;
    }

    /// Cumulative bytes received after a chunk was written.
    fn on_progress(&self, received: u64, total: Option<u64>) {
        let _ = (received, total);
    }

    /// The transfer reached a terminal state.
    fn on_completed(&self, status: TransferStatus, message: Option<&str>) {
        let _ = (status, message);
    }

    /// Filename negotiation produced a different name than requested.
    fn on_filename_updated(&self, new_name: &str) {
        let _ = new_name;
    }
}

/// Shared cancellation flag between a caller and an in-flight transfer.
///
/// Cancellation is cooperative and polled: the flag is observed before each
/// redirect hop and before each chunk read, never mid-chunk. Once observed,
/// the request unwinds with [`FetchError::Cancelled`](crate::FetchError::Cancelled).
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the associated transfer.
    pub fn cancel(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Clears the flag so the token can be reused for a new request.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}
