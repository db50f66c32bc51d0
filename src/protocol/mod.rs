//! Channel wire format.
//!
//! Both directions use JSON text frames discriminated by a `type` field.
//!
//! | Message | Direction | Shape |
//! |---------|-----------|-------|
//! | [`Command`] | Client → Server | `{ "type": name, ...payload }` |
//! | [`InboundMessage`] | Server → Client | `{ "type": kind, ...fields }` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Outbound commands and their names |
//! | `event` | Inbound classification and fan-out table |

// ============================================================================
// Submodules
// ============================================================================

/// Outbound command frames.
pub mod command;

/// Inbound frame classification.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, Payload};
pub use event::{InboundMessage, MessageKind, names};
