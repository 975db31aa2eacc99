//! Session/cookie collaborator boundary.
//!
//! Cookie-jar persistence lives outside the engine. The executor calls
//! [`SessionHooks::attach`] before connecting to a rate-limited host and
//! [`SessionHooks::capture`] after a successful connect; both are pure
//! side-effecting hooks whose return values the engine never consumes.

use reqwest::Response;
use reqwest::header::HeaderMap;

/// External session state hooks.
///
/// Implementations typically inject a `Cookie` header in [`attach`](Self::attach)
/// and persist any `Set-Cookie` headers in [`capture`](Self::capture).
pub trait SessionHooks: Send + Sync {
    /// Adds session headers to an outgoing request.
    ///
    /// `mode` is an optional caller-selected presentation mode forwarded
    /// verbatim from the executor (some sites encode it as a cookie).
    fn attach(&self, headers: &mut HeaderMap, mode: Option<&str>);

    /// Observes a successful response so updated session tokens can be
    /// persisted.
    fn capture(&self, response: &Response);
}
