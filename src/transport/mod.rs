//! Channel transport layer.
//!
//! One WebSocket connection per channel, owned by the
//! [`ConnectionManager`] and reopened on failure.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐   Command   ┌────────────┐   text frame   ┌──────────┐
//! │  ConnectionManager   │────────────►│  Link task │───────────────►│  Server  │
//! │  state + timers      │             │            │                │          │
//! │  OutboundQueue       │◄────────────│  Transport │◄───────────────│          │
//! └──────────────────────┘  callbacks  └────────────┘   text frame   └──────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `ConnectionManager::connect` - Resolve token, spawn a link
//! 2. `Connector::connect` - Open the transport (`?token=...` attached)
//! 3. Link opened - State `Connected`, queued commands flushed
//! 4. Link closed - Backoff, rotate or stop
//! 5. `ConnectionManager::disconnect` - Cancel timers, close the transport
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Transport traits, WebSocket connector, link event loop |
//! | `queue` | Outbound command FIFO |
//! | `manager` | Reconnecting state machine |

// ============================================================================
// Submodules
// ============================================================================

/// Transport traits and the per-connection event loop.
pub mod connection;

/// Reconnecting connection state machine.
pub mod manager;

/// Outbound command queue.
pub mod queue;

#[cfg(test)]
pub(crate) mod mock;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connector, FrameSink, FrameSource, Transport, WsConnector};
pub use manager::{ChannelStatus, ConnectionManager, ConnectionState};
pub use queue::OutboundQueue;
