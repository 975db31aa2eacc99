//! Resilient HTTP execution engine.
//!
//! Wraps a strategy-driven request pipeline around [`reqwest`]: manual
//! redirect handling, bounded retries that resume from the last redirect
//! target, per-site rate limiting, anti-automation block detection, and
//! streaming downloads with atomic finalization.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fetch_engine::{EngineConfig, GetText, RequestExecutor};
//!
//! # async fn run() -> Result<(), fetch_engine::FetchError> {
//! let config = Arc::new(EngineConfig::default());
//! let mut executor = RequestExecutor::new(config);
//! let mut request = GetText::new("https://example.com/api/status");
//! let body = executor.execute(&mut request).await?;
//! println!("{body}");
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod executor;
pub mod filename;
pub mod listener;
pub mod proxy;
pub mod rate_limit;
pub mod session;
pub mod strategy;
mod transfer;

pub use config::{BlockSignature, EngineConfig};
pub use error::FetchError;
pub use executor::RequestExecutor;
pub use filename::ExtensionPolicy;
pub use listener::{CancelToken, TransferListener, TransferStatus};
pub use proxy::{ProxyPool, ProxyStore};
pub use rate_limit::RateLimiter;
pub use session::SessionHooks;
pub use strategy::{
    AccessProbe, AttemptContext, Download, DownloadOptions, FormPart, GetImage, GetText,
    ImagePayload, MULTIPART_BOUNDARY, PostForm, PostJson, PostMultipart, RequestStrategy,
};
