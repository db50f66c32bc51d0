//! Realtime event channel - a reconnecting WebSocket event client.
//!
//! Keeps one long-lived, authenticated connection to a task server and
//! turns its JSON frames into named events for any number of subscribers.
//!
//! # Architecture
//!
//! - **Address resolution**: explicit address, API base, page origin and a
//!   local default become an ordered [`CandidateList`]
//! - **Authentication**: a [`TokenProvider`] is asked for a token before
//!   every attempt; no token means no connection
//! - **Connection manager**: linear backoff, endpoint rotation after
//!   repeated failures, outbound FIFO queue flushed on open
//! - **Event bus**: decoded frames are published by name, some under
//!   several names
//!
//! # Quick Start
//!
//! ```no_run
//! use realtime_channel::{Channel, ChannelOptions, SharedToken, TaskId, names};
//!
//! #[tokio::main]
//! async fn main() -> realtime_channel::Result<()> {
//!     let tokens = SharedToken::with_token("session-token");
//!     let channel = Channel::builder()
//!         .options(ChannelOptions::from_env())
//!         .token_provider(tokens.clone())
//!         .build()?;
//!
//!     channel.subscribe(names::TASK_PROGRESS, |payload| {
//!         println!("progress: {payload}");
//!     });
//!
//!     channel.connect();
//!     channel.subscribe_to_task(&TaskId::new("42"));
//!
//!     // After logout
//!     tokens.clear();
//!     channel.refresh(None);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`channel`] | [`Channel`] facade and [`Subscriptions`] guard |
//! | [`config`] | [`ChannelOptions`] and [`ChannelBuilder`] |
//! | [`endpoint`] | Address normalization and [`CandidateList`] |
//! | [`auth`] | Token providers |
//! | [`events`] | [`EventBus`] publish/subscribe registry |
//! | [`protocol`] | Command and inbound frame types |
//! | [`transport`] | Connector seam and [`ConnectionManager`] |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//!
//! # Features
//!
//! - `rustls`: `wss://` support with bundled WebPKI roots
//! - `native-tls`: `wss://` support through the platform TLS library

// ============================================================================
// Modules
// ============================================================================

/// Token providers consulted before each connection attempt.
pub mod auth;

/// Channel facade.
///
/// Use [`Channel::builder()`] to create a configured channel.
pub mod channel;

/// Channel options and builder.
pub mod config;

/// Endpoint normalization and candidate resolution.
pub mod endpoint;

/// Error types and result aliases.
///
/// Only construction and the transport seam return [`Result<T>`]; runtime
/// failures become state transitions and lifecycle events.
pub mod error;

/// Name-keyed event publish/subscribe.
pub mod events;

/// Type-safe identifiers.
pub mod identifiers;

/// Wire message types.
pub mod protocol;

/// WebSocket transport and connection state machine.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Channel types
pub use channel::{Channel, Subscriptions};

// Configuration types
pub use config::{ChannelBuilder, ChannelOptions};

// Endpoint types
pub use endpoint::{CandidateList, Endpoint};

// Auth types
pub use auth::{SharedToken, StaticToken, TokenProvider};

// Event types
pub use events::{EventBus, Handler};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{SessionId, SubscriptionId, TaskId};

// Protocol types
pub use protocol::{Command, InboundMessage, MessageKind, Payload, names};

// Transport types
pub use transport::{
    ChannelStatus, ConnectionManager, ConnectionState, Connector, FrameSink, FrameSource,
    Transport, WsConnector,
};
