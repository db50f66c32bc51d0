//! Channel configuration.
//!
//! Addresses feed the endpoint resolver; timing and capacity values drive
//! the connection manager's retry and queueing policy.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use realtime_channel::ChannelOptions;
//!
//! let options = ChannelOptions::new()
//!     .with_api_base_url("https://api.example.com/api/v1")
//!     .with_base_delay(Duration::from_millis(500))
//!     .with_max_attempts_per_endpoint(3);
//!
//! assert_eq!(options.max_attempts_per_endpoint, 3);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::env;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable holding an explicit channel address.
pub const ENV_WS_URL: &str = "REALTIME_WS_URL";

/// Environment variable holding the HTTP API base address.
pub const ENV_API_BASE_URL: &str = "REALTIME_API_BASE_URL";

/// Environment variable holding the page origin.
pub const ENV_PAGE_ORIGIN: &str = "REALTIME_PAGE_ORIGIN";

/// Default unit of linear reconnect backoff.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default poll interval while waiting for a token.
pub const DEFAULT_TOKEN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Default consecutive failures tolerated per endpoint before rotating.
pub const DEFAULT_MAX_ATTEMPTS_PER_ENDPOINT: u32 = 5;

/// Default outbound queue bound.
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

// ============================================================================
// ChannelOptions
// ============================================================================

/// Realtime channel configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Explicit channel address. Highest priority candidate.
    pub ws_url: Option<String>,

    /// HTTP API base address; the channel address is derived from it.
    pub api_base_url: Option<String>,

    /// Origin of the hosting page, when running embedded in one.
    pub page_origin: Option<String>,

    /// Backoff unit: attempt `n` waits `base_delay * n`.
    pub base_delay: Duration,

    /// Fixed delay between checks for a token that is not yet available.
    pub token_retry_delay: Duration,

    /// Consecutive failures against one endpoint before moving to the next.
    pub max_attempts_per_endpoint: u32,

    /// Maximum queued commands; the oldest is dropped beyond this.
    pub queue_capacity: usize,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ChannelOptions {
    /// Creates options with default timing and no addresses.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ws_url: None,
            api_base_url: None,
            page_origin: None,
            base_delay: DEFAULT_BASE_DELAY,
            token_retry_delay: DEFAULT_TOKEN_RETRY_DELAY,
            max_attempts_per_endpoint: DEFAULT_MAX_ATTEMPTS_PER_ENDPOINT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Creates options with addresses read from the environment.
    ///
    /// Unset or blank variables leave the field empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads addresses through an arbitrary lookup function.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            ws_url: read(ENV_WS_URL),
            api_base_url: read(ENV_API_BASE_URL),
            page_origin: read(ENV_PAGE_ORIGIN),
            ..Self::new()
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ChannelOptions {
    /// Sets the explicit channel address.
    #[inline]
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Sets the HTTP API base address.
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets the page origin.
    #[inline]
    #[must_use]
    pub fn with_page_origin(mut self, origin: impl Into<String>) -> Self {
        self.page_origin = Some(origin.into());
        self
    }

    /// Sets the backoff unit.
    #[inline]
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the token poll interval.
    #[inline]
    #[must_use]
    pub fn with_token_retry_delay(mut self, delay: Duration) -> Self {
        self.token_retry_delay = delay;
        self
    }

    /// Sets how many consecutive failures one endpoint may accumulate.
    #[inline]
    #[must_use]
    pub fn with_max_attempts_per_endpoint(mut self, attempts: u32) -> Self {
        self.max_attempts_per_endpoint = attempts;
        self
    }

    /// Sets the outbound queue bound.
    #[inline]
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ChannelOptions {
    /// Checks that timing and capacity values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero delays, zero attempts or a zero
    /// queue capacity.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay.is_zero() {
            return Err(Error::config("base_delay must be greater than zero"));
        }
        if self.token_retry_delay.is_zero() {
            return Err(Error::config("token_retry_delay must be greater than zero"));
        }
        if self.max_attempts_per_endpoint == 0 {
            return Err(Error::config("max_attempts_per_endpoint must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::config("queue_capacity must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
