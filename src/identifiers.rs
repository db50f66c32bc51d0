//! Type-safe identifiers.
//!
//! Newtype wrappers keep subscription handles and server-side identifiers
//! from being mixed up at call sites.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// SubscriptionId
// ============================================================================

/// Global counter for subscription handles.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by a subscription, used to remove it again.
///
/// Ids are unique for the lifetime of the process and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(NonZeroU64);

impl SubscriptionId {
    /// Allocates the next subscription id.
    #[must_use]
    pub fn next() -> Self {
        let raw = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1 and would need 2^64 subscriptions to wrap.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Server-side identifiers
// ============================================================================

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id! {
    /// Server-side identifier of a background task.
    TaskId
}

string_id! {
    /// Server-side identifier of a session-scoped stream.
    SessionId
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_ids_are_unique_and_increasing() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
        assert!(b > a);
        assert!(a.as_u64() > 0);
    }

    #[test]
    fn test_subscription_id_display() {
        let id = SubscriptionId::next();
        assert_eq!(id.to_string(), format!("sub-{}", id.as_u64()));
    }

    #[test]
    fn test_task_id_serializes_as_plain_string() {
        let id = TaskId::from("42");
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "\"42\"");
        assert_eq!(id.as_str(), "42");
    }

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new(String::from("s-1"));
        assert_eq!(id.to_string(), "s-1");
    }
}
