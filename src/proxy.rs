//! Round-robin proxy pool with remote refresh and persisted fallback.
//!
//! The pool is a process-wide shared singleton. The list and the rotating
//! cursor are protected by one lock and always change together: a refresh
//! either installs a new list with a re-randomized cursor or leaves the pool
//! untouched.

use std::sync::Mutex;

use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::executor::RequestExecutor;
use crate::strategy::PostJson;

/// External persistence for the last-known proxy list.
///
/// The engine only calls out through this trait; storage format and location
/// are the caller's concern.
pub trait ProxyStore: Send + Sync {
    /// Loads the previously persisted list, if any.
    fn load(&self) -> Option<Vec<String>>;

    /// Persists a freshly fetched list.
    fn save(&self, urls: &[String]);
}

#[derive(Debug)]
struct PoolState {
    urls: Vec<String>,
    cursor: usize,
}

/// Rotating set of proxy endpoints.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
}

/// Wire shape of the remote proxy-list response.
///
/// Anything that fails to deserialize into this shape is a refresh failure.
#[derive(Debug, Deserialize)]
struct ProxyListResponse {
    proxy_urls: ProxyListBody,
}

#[derive(Debug, Deserialize)]
struct ProxyListBody {
    urls: Vec<String>,
}

impl ProxyPool {
    /// Creates a pool over an initial list, with a randomized cursor.
    #[must_use]
    pub fn new(urls: Vec<String>) -> Self {
        let cursor = random_cursor(urls.len());
        Self {
            state: Mutex::new(PoolState { urls, cursor }),
        }
    }

    /// Number of endpoints currently in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().urls.len()
    }

    /// Whether the pool has no endpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().urls.is_empty()
    }

    /// Returns the next endpoint and advances the cursor.
    ///
    /// The cursor is normalized into `[0, len)` before use, so `len()`
    /// consecutive calls visit every entry exactly once regardless of the
    /// starting position.
    pub fn next(&self) -> Option<String> {
        let mut state = self.lock();
        if state.urls.is_empty() {
            return None;
        }
        if state.cursor >= state.urls.len() {
            state.cursor = 0;
        }
        let url = state.urls[state.cursor].clone();
        state.cursor += 1;
        Some(url)
    }

    /// Replaces the list and re-randomizes the cursor, atomically.
    ///
    /// An empty candidate list is rejected and the previous list is retained
    /// unchanged.
    pub fn replace(&self, urls: Vec<String>) {
        if urls.is_empty() {
            warn!("rejecting empty proxy list, keeping previous entries");
            return;
        }
        let cursor = random_cursor(urls.len());
        let mut state = self.lock();
        state.urls = urls;
        state.cursor = cursor;
    }

    /// Refreshes the pool from the remote JSON source.
    ///
    /// Sends `{"method": "proxy_urls"}` to `api_url` and expects an object
    /// with a `proxy_urls.urls` list of endpoint strings. On success the new
    /// list is installed and persisted through `store`; on any failure
    /// (network, parse, empty list) the pool silently falls back to the
    /// persisted list, re-randomizing the cursor the same way.
    ///
    /// Callers are expected to dispatch this onto a background worker; it is
    /// an ordinary blocking point on the task that runs it.
    #[instrument(skip(self, executor, store))]
    pub async fn refresh(
        &self,
        executor: &mut RequestExecutor,
        api_url: &str,
        store: &dyn ProxyStore,
    ) {
        match fetch_remote_list(executor, api_url).await {
            Some(urls) if !urls.is_empty() => {
                debug!(count = urls.len(), "installing refreshed proxy list");
                self.replace(urls.clone());
                store.save(&urls);
            }
            _ => {
                warn!("proxy refresh failed, falling back to persisted list");
                if let Some(urls) = store.load() {
                    self.replace(urls);
                }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

async fn fetch_remote_list(executor: &mut RequestExecutor, api_url: &str) -> Option<Vec<String>> {
    let mut request = PostJson::new(api_url, json!({ "method": "proxy_urls" }));
    let body = match executor.execute(&mut request).await {
        Ok(body) => body,
        Err(error) => {
            debug!(error = %error, "proxy list request failed");
            return None;
        }
    };
    match serde_json::from_str::<ProxyListResponse>(&body) {
        Ok(parsed) => Some(parsed.proxy_urls.urls),
        Err(error) => {
            debug!(error = %error, "proxy list response had unexpected shape");
            None
        }
    }
}

fn random_cursor(len: usize) -> usize {
    if len == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..len)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn pool_with(urls: &[&str]) -> ProxyPool {
        ProxyPool::new(urls.iter().map(|u| (*u).to_string()).collect())
    }

    #[test]
    fn test_round_robin_visits_every_entry_once() {
        let pool = pool_with(&["http://a", "http://b", "http://c"]);
        let mut seen = HashSet::new();
        for _ in 0..pool.len() {
            assert!(seen.insert(pool.next().unwrap()), "entry visited twice");
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_round_robin_property_holds_from_any_cursor() {
        // Advance the cursor to arbitrary positions, then check the
        // visit-each-once window again.
        let pool = pool_with(&["http://a", "http://b", "http://c", "http://d"]);
        for skip in 0..10 {
            for _ in 0..skip {
                pool.next();
            }
            let mut seen = HashSet::new();
            for _ in 0..pool.len() {
                seen.insert(pool.next().unwrap());
            }
            assert_eq!(seen.len(), 4, "window starting after {skip} skips");
        }
    }

    #[test]
    fn test_replace_with_empty_list_retains_previous() {
        let pool = pool_with(&["http://a", "http://b"]);
        pool.replace(Vec::new());
        assert_eq!(pool.len(), 2);
        assert!(pool.next().is_some());
    }

    #[test]
    fn test_replace_swaps_list_and_bounds_cursor() {
        let pool = pool_with(&["http://a", "http://b", "http://c"]);
        pool.next();
        pool.replace(vec!["http://x".to_string()]);
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.next().unwrap(), "http://x");
        assert_eq!(pool.next().unwrap(), "http://x");
    }

    #[test]
    fn test_empty_pool_yields_none() {
        let pool = ProxyPool::new(Vec::new());
        assert!(pool.next().is_none());
        assert!(pool.is_empty());
    }
}
