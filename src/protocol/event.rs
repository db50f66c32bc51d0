//! Inbound message classification.
//!
//! Every inbound frame is a JSON object carrying its kind under `type`.
//! [`InboundMessage::decode`] parses a frame into a closed set of kinds and
//! [`InboundMessage::routes`] yields the subscriber-facing event names it
//! is published under.
//!
//! # Fan-out Table
//!
//! | `type` | Event names | Payload |
//! |--------|-------------|---------|
//! | `connection_established` | `connection_established` | frame |
//! | `heartbeat` | `heartbeat` | frame |
//! | `active_tasks` | `active_tasks`, `heartbeat` | frame |
//! | `task_started` | `task_started` | frame |
//! | `task_progress` | `task_progress` | frame |
//! | `task_completed` | `task_completed` | frame |
//! | `task_failed` | `task_failed` | frame |
//! | `progress_event` | `progress_event`, `task_progress` | inner `event` |
//! | `interaction_update` | `interaction_update` | frame |
//! | `notification` | `notification` | frame |
//! | `task_result` | `task_result` | frame |
//! | `history_events` | `history_events` | frame |
//! | `pong` | `pong` | frame |
//! | anything else | `message` | frame |

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Map, Value, from_str};

use crate::error::{Error, Result};

use super::command::TYPE_KEY;

// ============================================================================
// Event Names
// ============================================================================

/// Subscriber-facing event names published by the channel.
pub mod names {
    /// Server acknowledged the connection.
    pub const CONNECTION_ESTABLISHED: &str = "connection_established";
    /// Periodic liveness beacon, optionally with active tasks.
    pub const HEARTBEAT: &str = "heartbeat";
    /// Snapshot of tasks currently running for the user.
    pub const ACTIVE_TASKS: &str = "active_tasks";
    /// Task lifecycle: started.
    pub const TASK_STARTED: &str = "task_started";
    /// Task lifecycle: progress update.
    pub const TASK_PROGRESS: &str = "task_progress";
    /// Task lifecycle: completed.
    pub const TASK_COMPLETED: &str = "task_completed";
    /// Task lifecycle: failed.
    pub const TASK_FAILED: &str = "task_failed";
    /// Generic progress wrapper.
    pub const PROGRESS_EVENT: &str = "progress_event";
    /// A pending user interaction changed.
    pub const INTERACTION_UPDATE: &str = "interaction_update";
    /// User-facing notification.
    pub const NOTIFICATION: &str = "notification";
    /// Domain result produced by a task.
    pub const TASK_RESULT: &str = "task_result";
    /// Replay of past events.
    pub const HISTORY_EVENTS: &str = "history_events";
    /// Answer to `ping`.
    pub const PONG: &str = "pong";
    /// Catch-all for unrecognized kinds.
    pub const MESSAGE: &str = "message";

    /// Transport opened.
    pub const CONNECTED: &str = "connected";
    /// Transport closed.
    pub const DISCONNECTED: &str = "disconnected";
    /// Reconnect scheduled.
    pub const RECONNECTING: &str = "reconnecting";
    /// Gave up on one endpoint and moved to the next.
    pub const ENDPOINT_ROTATED: &str = "endpoint_rotated";
    /// Every candidate exhausted; no further attempts until `connect`.
    pub const MAX_RECONNECT_EXCEEDED: &str = "max_reconnect_exceeded";
}

// ============================================================================
// MessageKind
// ============================================================================

/// Closed set of inbound message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// `connection_established`
    ConnectionEstablished,
    /// `heartbeat`
    Heartbeat,
    /// `active_tasks`
    ActiveTasks,
    /// `task_started`
    TaskStarted,
    /// `task_progress`
    TaskProgress,
    /// `task_completed`
    TaskCompleted,
    /// `task_failed`
    TaskFailed,
    /// `progress_event`, wrapping an inner `event` object.
    ProgressEvent,
    /// `interaction_update`
    InteractionUpdate,
    /// `notification`
    Notification,
    /// `task_result`
    TaskResult,
    /// `history_events`
    HistoryEvents,
    /// `pong`
    Pong,
    /// Any other discriminator.
    Unknown,
}

impl MessageKind {
    /// Every kind, in table order.
    pub const ALL: [MessageKind; 14] = [
        Self::ConnectionEstablished,
        Self::Heartbeat,
        Self::ActiveTasks,
        Self::TaskStarted,
        Self::TaskProgress,
        Self::TaskCompleted,
        Self::TaskFailed,
        Self::ProgressEvent,
        Self::InteractionUpdate,
        Self::Notification,
        Self::TaskResult,
        Self::HistoryEvents,
        Self::Pong,
        Self::Unknown,
    ];

    /// Classifies a discriminator.
    #[must_use]
    pub fn from_discriminator(kind: &str) -> Self {
        match kind {
            names::CONNECTION_ESTABLISHED => Self::ConnectionEstablished,
            names::HEARTBEAT => Self::Heartbeat,
            names::ACTIVE_TASKS => Self::ActiveTasks,
            names::TASK_STARTED => Self::TaskStarted,
            names::TASK_PROGRESS => Self::TaskProgress,
            names::TASK_COMPLETED => Self::TaskCompleted,
            names::TASK_FAILED => Self::TaskFailed,
            names::PROGRESS_EVENT => Self::ProgressEvent,
            names::INTERACTION_UPDATE => Self::InteractionUpdate,
            names::NOTIFICATION => Self::Notification,
            names::TASK_RESULT => Self::TaskResult,
            names::HISTORY_EVENTS => Self::HistoryEvents,
            names::PONG => Self::Pong,
            _ => Self::Unknown,
        }
    }

    /// Event names this kind is published under, specific name first.
    #[must_use]
    pub const fn routes(self) -> &'static [&'static str] {
        use names::*;

        match self {
            Self::ConnectionEstablished => &[CONNECTION_ESTABLISHED],
            Self::Heartbeat => &[HEARTBEAT],
            Self::ActiveTasks => &[ACTIVE_TASKS, HEARTBEAT],
            Self::TaskStarted => &[TASK_STARTED],
            Self::TaskProgress => &[TASK_PROGRESS],
            Self::TaskCompleted => &[TASK_COMPLETED],
            Self::TaskFailed => &[TASK_FAILED],
            Self::ProgressEvent => &[PROGRESS_EVENT, TASK_PROGRESS],
            Self::InteractionUpdate => &[INTERACTION_UPDATE],
            Self::Notification => &[NOTIFICATION],
            Self::TaskResult => &[TASK_RESULT],
            Self::HistoryEvents => &[HISTORY_EVENTS],
            Self::Pong => &[PONG],
            Self::Unknown => &[MESSAGE],
        }
    }
}

// ============================================================================
// InboundMessage
// ============================================================================

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Classified kind.
    pub kind: MessageKind,

    /// Value handed to subscribers.
    pub payload: Value,
}

impl InboundMessage {
    /// Decodes and classifies a text frame.
    ///
    /// A `progress_event` publishes its inner `event` object; when that
    /// object is missing the frame is treated as unknown.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the frame is not JSON
    /// - [`Error::Protocol`] if it is not an object with a string `type`
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = from_str(text)?;
        let Value::Object(frame) = value else {
            return Err(Error::protocol("frame is not a JSON object"));
        };

        let kind = match frame.get(TYPE_KEY) {
            Some(Value::String(kind)) => MessageKind::from_discriminator(kind),
            Some(_) => return Err(Error::protocol("frame 'type' is not a string")),
            None => return Err(Error::protocol("frame has no 'type'")),
        };

        if kind == MessageKind::ProgressEvent {
            return Ok(Self::unwrap_progress(frame));
        }

        Ok(Self {
            kind,
            payload: Value::Object(frame),
        })
    }

    fn unwrap_progress(mut frame: Map<String, Value>) -> Self {
        match frame.remove("event") {
            Some(inner @ Value::Object(_)) => Self {
                kind: MessageKind::ProgressEvent,
                payload: inner,
            },
            other => {
                if let Some(value) = other {
                    frame.insert(String::from("event"), value);
                }
                Self {
                    kind: MessageKind::Unknown,
                    payload: Value::Object(frame),
                }
            }
        }
    }

    /// Event names to publish under.
    #[inline]
    #[must_use]
    pub fn routes(&self) -> &'static [&'static str] {
        self.kind.routes()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_task_lifecycle_routes() {
        for (kind, name) in [
            ("task_started", names::TASK_STARTED),
            ("task_progress", names::TASK_PROGRESS),
            ("task_completed", names::TASK_COMPLETED),
            ("task_failed", names::TASK_FAILED),
        ] {
            let text = format!(r#"{{"type":"{kind}","task_id":"1"}}"#);
            let message = InboundMessage::decode(&text).expect("decode");
            assert_eq!(message.routes(), &[name]);
            assert_eq!(message.payload["task_id"], json!("1"));
        }
    }

    #[test]
    fn test_progress_event_unwraps_and_fans_out() {
        let text = r#"{"type":"progress_event","event":{"task_id":"7","progress":50}}"#;
        let message = InboundMessage::decode(text).expect("decode");

        assert_eq!(message.kind, MessageKind::ProgressEvent);
        assert_eq!(message.routes(), &["progress_event", "task_progress"]);
        assert_eq!(message.payload, json!({ "task_id": "7", "progress": 50 }));
    }

    #[test]
    fn test_progress_event_without_object_falls_back() {
        let text = r#"{"type":"progress_event","event":"oops"}"#;
        let message = InboundMessage::decode(text).expect("decode");

        assert_eq!(message.kind, MessageKind::Unknown);
        assert_eq!(message.routes(), &[names::MESSAGE]);
        assert_eq!(message.payload["event"], json!("oops"));
    }

    #[test]
    fn test_unknown_discriminator_routes_to_message() {
        let message = InboundMessage::decode(r#"{"type":"brand_new","x":1}"#).expect("decode");
        assert_eq!(message.kind, MessageKind::Unknown);
        assert_eq!(message.routes(), &["message"]);
        assert_eq!(message.payload["x"], json!(1));
    }

    #[test]
    fn test_active_tasks_also_heartbeat() {
        let message =
            InboundMessage::decode(r#"{"type":"active_tasks","tasks":[]}"#).expect("decode");
        assert_eq!(message.routes(), &["active_tasks", "heartbeat"]);
    }

    #[test]
    fn test_decode_rejects_malformed() {
        assert!(matches!(InboundMessage::decode("not json"), Err(Error::Json(_))));
        assert!(matches!(
            InboundMessage::decode("[1,2]"),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"kind":"x"}"#),
            Err(Error::Protocol { .. })
        ));
        assert!(matches!(
            InboundMessage::decode(r#"{"type":3}"#),
            Err(Error::Protocol { .. })
        ));
    }

    #[test]
    fn test_every_kind_has_a_route_and_roundtrips_its_name() {
        for kind in MessageKind::ALL {
            let routes = kind.routes();
            assert!(!routes.is_empty(), "{kind:?} has no route");
            if kind != MessageKind::Unknown {
                assert_eq!(MessageKind::from_discriminator(routes[0]), kind);
            }
        }
    }
}
