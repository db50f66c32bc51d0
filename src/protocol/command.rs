//! Outbound commands.
//!
//! A command serializes to a single JSON text frame with the command name
//! under `type` and the payload fields spread beside it:
//!
//! ```json
//! { "type": "subscribe_task", "task_id": "42" }
//! ```

// ============================================================================
// Imports
// ============================================================================

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value, json};

use crate::identifiers::{SessionId, TaskId};

// ============================================================================
// Command Names
// ============================================================================

/// Start receiving events for one task.
pub const SUBSCRIBE_TASK: &str = "subscribe_task";

/// Stop receiving events for one task.
pub const UNSUBSCRIBE_TASK: &str = "unsubscribe_task";

/// Start receiving events for one session-scoped stream.
pub const SUBSCRIBE_SESSION: &str = "subscribe_session";

/// Stop receiving events for one session-scoped stream.
pub const UNSUBSCRIBE_SESSION: &str = "unsubscribe_session";

/// Liveness probe; the server answers with `pong`.
pub const PING: &str = "ping";

/// Discriminator key shared by inbound and outbound frames.
pub(crate) const TYPE_KEY: &str = "type";

// ============================================================================
// Command
// ============================================================================

/// Payload of a command: top-level fields of the outbound frame.
pub type Payload = Map<String, Value>;

/// A named outbound command with an optional payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    /// Command name, sent as `type`.
    pub name: String,

    /// Fields spread next to `type`.
    pub payload: Option<Payload>,
}

impl Command {
    /// Creates a command.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Option<Payload>) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }

    /// Creates a command without payload.
    #[inline]
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self::new(name, None)
    }

    /// `subscribe_task` for `task_id`.
    #[must_use]
    pub fn subscribe_task(task_id: &TaskId) -> Self {
        Self::new(SUBSCRIBE_TASK, object(json!({ "task_id": task_id })))
    }

    /// `unsubscribe_task` for `task_id`.
    #[must_use]
    pub fn unsubscribe_task(task_id: &TaskId) -> Self {
        Self::new(UNSUBSCRIBE_TASK, object(json!({ "task_id": task_id })))
    }

    /// `subscribe_session` for `session_id`.
    #[must_use]
    pub fn subscribe_session(session_id: &SessionId) -> Self {
        Self::new(SUBSCRIBE_SESSION, object(json!({ "session_id": session_id })))
    }

    /// `unsubscribe_session` for `session_id`.
    #[must_use]
    pub fn unsubscribe_session(session_id: &SessionId) -> Self {
        Self::new(UNSUBSCRIBE_SESSION, object(json!({ "session_id": session_id })))
    }

    /// `ping`.
    #[inline]
    #[must_use]
    pub fn ping() -> Self {
        Self::bare(PING)
    }

    /// Encodes the command as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`](crate::Error::Json) if a payload value
    /// cannot be serialized.
    pub fn to_frame(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Unwraps a `json!` object literal into a payload map.
fn object(value: Value) -> Option<Payload> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

impl Serialize for Command {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self
            .payload
            .iter()
            .flatten()
            .filter(|(key, _)| key.as_str() != TYPE_KEY);

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TYPE_KEY, &self.name)?;
        for (key, value) in fields {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ============================================================================
// Tests
// ============================================================================
