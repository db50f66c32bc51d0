//! Endpoint normalization and candidate resolution.
//!
//! The channel may be reachable at several addresses. [`CandidateList`]
//! collects them once, in priority order:
//!
//! 1. explicit channel address (`ws_url`)
//! 2. address derived from the HTTP API base (`api_base_url`)
//! 3. origin of the hosting page (`page_origin`)
//! 4. [`DEFAULT_ENDPOINT`], always present
//!
//! Every candidate is normalized to a WebSocket scheme and the global
//! stream path:
//!
//! | Input | Endpoint |
//! |-------|----------|
//! | `https://api.example.com/api/v1` | `wss://api.example.com/ws/global` |
//! | `http://localhost:8000` | `ws://localhost:8000/ws/global` |
//! | `wss://rt.example.com/ws/task/7` | `wss://rt.example.com/ws/task/7` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use url::Url;

use crate::config::ChannelOptions;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Path prefix shared by every stream the server exposes.
pub const STREAM_PREFIX: &str = "/ws";

/// Path of the global event stream.
pub const GLOBAL_STREAM_PATH: &str = "/ws/global";

/// Last-resort candidate.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/global";

/// Query parameter carrying the bearer token.
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Trailing REST prefix stripped from the API base (`/api`, `/api/v2`, ...).
static API_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/api(?:/v\d+)?/?$").expect("valid API suffix pattern"));

/// [`DEFAULT_ENDPOINT`], parsed once.
static DEFAULT: LazyLock<Endpoint> =
    LazyLock::new(|| Endpoint::parse(DEFAULT_ENDPOINT).expect("valid default endpoint"));

// ============================================================================
// Endpoint
// ============================================================================

/// A normalized channel address (`ws://` or `wss://`, stream path, no query).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(Url);

impl Endpoint {
    /// Normalizes an address into an endpoint.
    ///
    /// `http`/`https` map to `ws`/`wss`. A missing scheme is treated as
    /// `ws`. Paths already under [`STREAM_PREFIX`] are kept; any other path
    /// gets [`GLOBAL_STREAM_PATH`] appended. Query and fragment are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEndpoint`] if the address does not parse,
    /// uses an unsupported scheme or has no host.
    pub fn parse(address: &str) -> Result<Self> {
        let trimmed = address.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_endpoint(address, "empty address"));
        }

        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("ws://{trimmed}")
        };

        let mut url =
            Url::parse(&with_scheme).map_err(|e| Error::invalid_endpoint(address, e.to_string()))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(Error::invalid_endpoint(
                    address,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };

        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid_endpoint(address, "missing host"));
        }

        url.set_scheme(scheme)
            .map_err(|()| Error::invalid_endpoint(address, "cannot switch scheme"))?;

        let path = url.path().trim_end_matches('/').to_string();
        if !is_stream_path(&path) {
            url.set_path(&format!("{path}{GLOBAL_STREAM_PATH}"));
        } else {
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(Self(url))
    }

    /// Derives the endpoint served next to an HTTP API base.
    ///
    /// A trailing `/api` or `/api/vN` segment is removed first.
    ///
    /// # Errors
    ///
    /// Same as [`Endpoint::parse`].
    pub fn from_api_base(address: &str) -> Result<Self> {
        let stripped = API_SUFFIX.replace(address.trim(), "");
        Self::parse(&stripped)
    }

    /// Derives the endpoint served by a page origin, ignoring its path.
    ///
    /// # Errors
    ///
    /// Same as [`Endpoint::parse`].
    pub fn from_origin(origin: &str) -> Result<Self> {
        let mut url = Url::parse(origin.trim())
            .map_err(|e| Error::invalid_endpoint(origin, e.to_string()))?;
        url.set_path("/");
        Self::parse(url.as_str())
    }

    /// Returns the endpoint as a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the underlying URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.0
    }

    /// Returns the transport URL carrying `token` as a query parameter.
    #[must_use]
    pub fn with_token(&self, token: &str) -> Url {
        let mut url = self.0.clone();
        url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        url
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns `true` for `/ws` and anything below it.
fn is_stream_path(path: &str) -> bool {
    path == STREAM_PREFIX || path.starts_with(&format!("{STREAM_PREFIX}/"))
}

// ============================================================================
// CandidateList
// ============================================================================

/// Ordered, deduplicated, never-empty list of endpoints.
///
/// Computed once from configuration. Order defines fallback priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateList {
    endpoints: Vec<Endpoint>,
}

impl CandidateList {
    /// Resolves candidates from configuration.
    ///
    /// Malformed inputs are skipped with a warning; the default endpoint is
    /// always appended.
    #[must_use]
    pub fn resolve(options: &ChannelOptions) -> Self {
        let sources: [(&str, Option<&str>, fn(&str) -> Result<Endpoint>); 3] = [
            ("ws_url", options.ws_url.as_deref(), Endpoint::parse),
            ("api_base_url", options.api_base_url.as_deref(), Endpoint::from_api_base),
            ("page_origin", options.page_origin.as_deref(), Endpoint::from_origin),
        ];

        let mut list = Self {
            endpoints: Vec::with_capacity(sources.len() + 1),
        };

        for (source, address, derive) in sources {
            let Some(address) = address else {
                continue;
            };
            match derive(address) {
                Ok(endpoint) => list.push(endpoint),
                Err(e) => warn!(source, address, error = %e, "Skipping malformed channel address"),
            }
        }

        list.push(DEFAULT.clone());

        debug!(candidates = ?list.endpoints.iter().map(Endpoint::as_str).collect::<Vec<_>>(), "Resolved channel candidates");
        list
    }

    /// Builds a list from explicit endpoints, dropping duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `endpoints` is empty.
    pub fn from_endpoints(endpoints: impl IntoIterator<Item = Endpoint>) -> Result<Self> {
        let mut list = Self {
            endpoints: Vec::new(),
        };
        for endpoint in endpoints {
            list.push(endpoint);
        }
        if list.endpoints.is_empty() {
            return Err(Error::config("candidate list must not be empty"));
        }
        Ok(list)
    }

    fn push(&mut self, endpoint: Endpoint) {
        if !self.endpoints.contains(&endpoint) {
            self.endpoints.push(endpoint);
        }
    }

    /// Returns the candidate at `cursor`, wrapping around.
    #[inline]
    #[must_use]
    pub fn get(&self, cursor: usize) -> &Endpoint {
        &self.endpoints[cursor % self.endpoints.len()]
    }

    /// Returns the number of candidates (at least one).
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// Always `false`; present for API symmetry.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Iterates candidates in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(list: &CandidateList) -> Vec<&str> {
        list.iter().map(Endpoint::as_str).collect()
    }

    #[test]
    fn test_scheme_mapping() {
        assert_eq!(
            Endpoint::parse("http://h:1").expect("parse").as_str(),
            "ws://h:1/ws/global"
        );
        assert_eq!(
            Endpoint::parse("https://h").expect("parse").as_str(),
            "wss://h/ws/global"
        );
        assert_eq!(
            Endpoint::parse("wss://h/").expect("parse").as_str(),
            "wss://h/ws/global"
        );
    }

    #[test]
    fn test_missing_scheme_defaults_to_ws() {
        assert_eq!(
            Endpoint::parse("localhost:9000").expect("parse").as_str(),
            "ws://localhost:9000/ws/global"
        );
    }

    #[test]
    fn test_stream_suffix_not_appended_twice() {
        assert_eq!(
            Endpoint::parse("wss://h/ws/global").expect("parse").as_str(),
            "wss://h/ws/global"
        );
        assert_eq!(
            Endpoint::parse("wss://h/ws/task/7/").expect("parse").as_str(),
            "wss://h/ws/task/7"
        );
        assert_eq!(Endpoint::parse("ws://h/ws").expect("parse").as_str(), "ws://h/ws");
        // `/wsx` is not a stream path.
        assert_eq!(
            Endpoint::parse("ws://h/wsx").expect("parse").as_str(),
            "ws://h/wsx/ws/global"
        );
    }

    #[test]
    fn test_query_and_fragment_dropped() {
        assert_eq!(
            Endpoint::parse("wss://h/ws/global?token=old#x")
                .expect("parse")
                .as_str(),
            "wss://h/ws/global"
        );
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("ftp://h").is_err());
        assert!(Endpoint::parse("http://").is_err());
        assert!(matches!(
            Endpoint::parse("ws://[::1"),
            Err(Error::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_api_base_suffix_stripped() {
        assert_eq!(
            Endpoint::from_api_base("https://api.example.com/api/v1")
                .expect("parse")
                .as_str(),
            "wss://api.example.com/ws/global"
        );
        assert_eq!(
            Endpoint::from_api_base("http://localhost:8000/api/")
                .expect("parse")
                .as_str(),
            "ws://localhost:8000/ws/global"
        );
        assert_eq!(
            Endpoint::from_api_base("https://example.com/backend")
                .expect("parse")
                .as_str(),
            "wss://example.com/backend/ws/global"
        );
    }

    #[test]
    fn test_origin_ignores_path() {
        assert_eq!(
            Endpoint::from_origin("https://app.example.com/projects/3")
                .expect("parse")
                .as_str(),
            "wss://app.example.com/ws/global"
        );
    }

    #[test]
    fn test_with_token_appends_query() {
        let endpoint = Endpoint::parse("wss://h").expect("parse");
        let url = endpoint.with_token("a b&c");
        assert_eq!(url.as_str(), "wss://h/ws/global?token=a+b%26c");
        // The endpoint itself stays untouched.
        assert_eq!(endpoint.as_str(), "wss://h/ws/global");
    }

    #[test]
    fn test_resolve_order_and_dedup() {
        let options = ChannelOptions::new()
            .with_ws_url("wss://rt.example.com")
            .with_api_base_url("https://rt.example.com/api")
            .with_page_origin("https://app.example.com");

        let list = CandidateList::resolve(&options);
        assert_eq!(
            strings(&list),
            vec![
                "wss://rt.example.com/ws/global",
                "wss://app.example.com/ws/global",
                DEFAULT_ENDPOINT,
            ]
        );
    }

    #[test]
    fn test_resolve_skips_malformed_and_never_empty() {
        let options = ChannelOptions::new()
            .with_ws_url("ftp://nope")
            .with_page_origin("not an origin");

        let list = CandidateList::resolve(&options);
        assert_eq!(strings(&list), vec![DEFAULT_ENDPOINT]);
        assert_eq!(list.len(), 1);
        assert!(!list.is_empty());
    }

    #[test]
    fn test_default_endpoint_is_normalized_and_always_last() {
        assert_eq!(DEFAULT.as_str(), DEFAULT_ENDPOINT);

        let options = ChannelOptions::new()
            .with_ws_url("wss://a")
            .with_api_base_url("ftp://files.example/api");
        let list = CandidateList::resolve(&options);
        assert_eq!(list.get(list.len() - 1), &*DEFAULT);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_default_deduplicated_against_config() {
        let options = ChannelOptions::new().with_api_base_url("http://localhost:8000/api/v1");
        let list = CandidateList::resolve(&options);
        assert_eq!(strings(&list), vec![DEFAULT_ENDPOINT]);
    }

    #[test]
    fn test_cursor_wraps() {
        let list = CandidateList::from_endpoints([
            Endpoint::parse("wss://a").expect("parse"),
            Endpoint::parse("wss://b").expect("parse"),
        ])
        .expect("list");

        assert_eq!(list.get(0).as_str(), "wss://a/ws/global");
        assert_eq!(list.get(1).as_str(), "wss://b/ws/global");
        assert_eq!(list.get(2).as_str(), "wss://a/ws/global");
    }

    #[test]
    fn test_from_endpoints_rejects_empty() {
        assert!(CandidateList::from_endpoints(Vec::new()).is_err());
    }
}
