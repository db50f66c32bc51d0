//! Bearer token providers.
//!
//! The channel never stores a token. It asks its [`TokenProvider`] right
//! before every connection attempt and again whenever it has to decide
//! whether reconnecting makes sense. `None` (or an empty string) means the
//! user is not logged in.
//!
//! # Example
//!
//! ```
//! use realtime_channel::{SharedToken, TokenProvider};
//!
//! let store = SharedToken::new();
//! assert_eq!(store.token(), None);
//!
//! store.set("secret");
//! assert_eq!(store.token().as_deref(), Some("secret"));
//!
//! store.clear();
//! assert_eq!(store.token(), None);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

// ============================================================================
// TokenProvider
// ============================================================================

/// Source of the current bearer token.
pub trait TokenProvider: Send + Sync {
    /// Returns the current token, or `None` when no credentials are active.
    fn token(&self) -> Option<String>;
}

impl<F> TokenProvider for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Resolves a token from a provider, treating empty strings as absent.
pub(crate) fn resolve(provider: &dyn TokenProvider) -> Option<String> {
    provider.token().filter(|token| !token.trim().is_empty())
}

// ============================================================================
// StaticToken
// ============================================================================

/// Provider that always returns the same token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Creates a provider for a fixed token.
    #[inline]
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticToken(***)")
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

// ============================================================================
// SharedToken
// ============================================================================

/// Mutable, cloneable token slot.
///
/// Stands in for a credential store: login calls [`set`](Self::set),
/// logout calls [`clear`](Self::clear). Clones share the same slot.
#[derive(Clone, Default)]
pub struct SharedToken {
    slot: Arc<RwLock<Option<String>>>,
}

impl SharedToken {
    /// Creates an empty slot.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a slot holding `token`.
    #[inline]
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let shared = Self::new();
        shared.set(token);
        shared
    }

    /// Stores a new token.
    pub fn set(&self, token: impl Into<String>) {
        *self.slot.write() = Some(token.into());
    }

    /// Removes the token.
    pub fn clear(&self) {
        *self.slot.write() = None;
    }
}

impl fmt::Debug for SharedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedToken")
            .field("present", &self.slot.read().is_some())
            .finish()
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.slot.read().clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.token().as_deref(), Some("abc"));
        assert_eq!(format!("{provider:?}"), "StaticToken(***)");
    }

    #[test]
    fn test_shared_token_clones_share_slot() {
        let store = SharedToken::new();
        let view = store.clone();

        store.set("t1");
        assert_eq!(view.token().as_deref(), Some("t1"));

        view.clear();
        assert_eq!(store.token(), None);
    }

    #[test]
    fn test_closure_provider() {
        let provider = || Some(String::from("from-closure"));
        assert_eq!(resolve(&provider).as_deref(), Some("from-closure"));
    }

    #[test]
    fn test_resolve_treats_blank_as_absent() {
        assert_eq!(resolve(&StaticToken::new("")), None);
        assert_eq!(resolve(&StaticToken::new("   ")), None);
        assert_eq!(resolve(&SharedToken::new()), None);
    }
}
