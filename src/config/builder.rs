//! Builder pattern for channel construction.
//!
//! Provides a fluent API for configuring and creating [`Channel`] instances.
//!
//! # Example
//!
//! ```no_run
//! use realtime_channel::{Channel, ChannelOptions, SharedToken};
//!
//! # async fn example() -> realtime_channel::Result<()> {
//! let tokens = SharedToken::new();
//! let channel = Channel::builder()
//!     .options(ChannelOptions::from_env())
//!     .token_provider(tokens.clone())
//!     .build()?;
//!
//! tokens.set("session-token");
//! channel.connect();
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::channel::Channel;
use crate::endpoint::CandidateList;
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::transport::{ConnectionManager, Connector, WsConnector};

use super::options::ChannelOptions;

// ============================================================================
// ChannelBuilder
// ============================================================================

/// Builder for configuring a [`Channel`] instance.
///
/// Use [`Channel::builder()`] to create a new builder.
#[derive(Default)]
pub struct ChannelBuilder {
    /// Addresses, timing and capacity.
    options: ChannelOptions,
    /// Token source; without one the channel never connects.
    tokens: Option<Arc<dyn TokenProvider>>,
    /// Transport factory, `WsConnector` when unset.
    connector: Option<Arc<dyn Connector>>,
    /// Explicit candidate list, bypassing address resolution.
    candidates: Option<CandidateList>,
}

impl fmt::Debug for ChannelBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelBuilder")
            .field("options", &self.options)
            .field("tokens", &self.tokens.is_some())
            .field("connector", &self.connector.is_some())
            .field("candidates", &self.candidates)
            .finish()
    }
}

// ============================================================================
// ChannelBuilder Implementation
// ============================================================================

impl ChannelBuilder {
    /// Creates a builder with default options and no token provider.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: ChannelOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the token provider consulted before every attempt.
    #[inline]
    #[must_use]
    pub fn token_provider(mut self, provider: impl TokenProvider + 'static) -> Self {
        self.tokens = Some(Arc::new(provider));
        self
    }

    /// Replaces the WebSocket connector.
    #[inline]
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Uses `candidates` instead of resolving them from the options.
    #[inline]
    #[must_use]
    pub fn candidates(mut self, candidates: CandidateList) -> Self {
        self.candidates = Some(candidates);
        self
    }

    /// Builds the channel with validation.
    ///
    /// The channel starts disconnected; call
    /// [`Channel::connect`] to open it. Timers and transports run on the
    /// Tokio runtime this is called from.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if an option is out of range
    /// - [`Error::Config`] if called outside a Tokio runtime
    pub fn build(self) -> Result<Channel> {
        self.options.validate()?;
        let runtime = Self::current_runtime()?;

        let candidates = self
            .candidates
            .unwrap_or_else(|| CandidateList::resolve(&self.options));
        let tokens = self.tokens.unwrap_or_else(|| Arc::new(NoToken));
        let connector = self.connector.unwrap_or_else(|| Arc::new(WsConnector));

        debug!(
            candidates = candidates.len(),
            first = %candidates.get(0),
            "Channel configured"
        );

        let events = EventBus::new();
        let manager =
            ConnectionManager::new(self.options, candidates, tokens, connector, events.clone(), runtime);

        Ok(Channel::new(manager, events))
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ChannelBuilder {
    /// Captures the runtime handle timers and transports are spawned on.
    fn current_runtime() -> Result<Handle> {
        Handle::try_current().map_err(|_| {
            Error::config(
                "Channel must be built inside a Tokio runtime.\n\
                 Example: call Channel::builder().build() from #[tokio::main]",
            )
        })
    }
}

/// Provider used when none was configured.
struct NoToken;

impl TokenProvider for NoToken {
    fn token(&self) -> Option<String> {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
