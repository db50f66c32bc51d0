//! Channel configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChannelOptions`] | Addresses, retry timing, queue bound |
//! | [`ChannelBuilder`] | Fluent builder producing a [`Channel`](crate::Channel) |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for channel construction.
pub mod builder;

/// Addresses, timing and capacity options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ChannelBuilder;
pub use options::ChannelOptions;
