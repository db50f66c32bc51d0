//! Event multiplexer.
//!
//! Publish/subscribe registry keyed by event name. It knows nothing about
//! transports: the connection manager publishes decoded frames and
//! lifecycle changes, collaborators subscribe to names.
//!
//! # Delivery Rules
//!
//! - Handlers for one name run in registration order.
//! - `emit` works on a snapshot, so handlers may subscribe or unsubscribe
//!   (even themselves) without affecting the delivery in progress.
//! - A panicking handler is logged and skipped; the remaining handlers
//!   still run.
//!
//! # Example
//!
//! ```
//! use realtime_channel::EventBus;
//! use serde_json::json;
//!
//! let bus = EventBus::new();
//! let id = bus.on("notification", |payload| println!("{payload}"));
//! assert_eq!(bus.emit("notification", &json!({ "text": "hi" })), 1);
//! assert!(bus.off("notification", id));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{trace, warn};

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

/// One registered handler.
struct Subscriber {
    id: SubscriptionId,
    handler: Handler,
}

/// Handlers per event name, in registration order.
type Registry = FxHashMap<String, Vec<Subscriber>>;

// ============================================================================
// EventBus
// ============================================================================

/// Name-keyed publish/subscribe registry.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("EventBus")
            .field("events", &registry.len())
            .field(
                "handlers",
                &registry.values().map(Vec::len).sum::<usize>(),
            )
            .finish()
    }
}

impl EventBus {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event` and returns its id.
    ///
    /// Registering the same closure twice yields two independent
    /// subscriptions.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.registry
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Subscriber {
                id,
                handler: Arc::new(handler),
            });

        trace!(event, %id, "Subscribed");
        id
    }

    /// Removes subscription `id` from `event`.
    ///
    /// Returns `false` (and does nothing) if it was not registered there.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut registry = self.registry.lock();
        let Some(subscribers) = registry.get_mut(event) else {
            return false;
        };

        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;

        if subscribers.is_empty() {
            registry.remove(event);
        }

        if removed {
            trace!(event, %id, "Unsubscribed");
        }
        removed
    }

    /// Invokes every handler registered for `event`.
    ///
    /// Returns the number of handlers that completed without panicking.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        let snapshot: Vec<(SubscriptionId, Handler)> = {
            let registry = self.registry.lock();
            match registry.get(event) {
                Some(subscribers) => subscribers
                    .iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    warn!(event, %id, panic = panic_message(&*panic), "Event handler panicked");
                }
            }
        }
        delivered
    }

    /// Returns the number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry.lock().get(event).map_or(0, Vec::len)
    }
}

/// Extracts the message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================
