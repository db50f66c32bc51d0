//! Channel facade.
//!
//! [`Channel`] is the only surface collaborators use: subscribe to event
//! names, send commands, query status and force reconnects. Subscriptions
//! go to the [`EventBus`], commands to the [`ConnectionManager`].
//!
//! # Example
//!
//! ```no_run
//! use realtime_channel::{Channel, SharedToken, TaskId, names};
//!
//! # async fn example() -> realtime_channel::Result<()> {
//! let tokens = SharedToken::with_token("session-token");
//! let channel = Channel::builder().token_provider(tokens).build()?;
//!
//! let mut subscriptions = channel.subscriptions();
//! subscriptions.subscribe(names::TASK_PROGRESS, |payload| {
//!     println!("progress: {payload}");
//! });
//!
//! channel.connect();
//! channel.subscribe_to_task(&TaskId::new("42"));
//!
//! // Dropping the guard removes every handler it registered.
//! drop(subscriptions);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::Value;

use crate::config::ChannelBuilder;
use crate::endpoint::{CandidateList, Endpoint};
use crate::events::EventBus;
use crate::identifiers::{SessionId, SubscriptionId, TaskId};
use crate::protocol::{Command, Payload};
use crate::transport::{ChannelStatus, ConnectionManager, ConnectionState};

// ============================================================================
// Channel
// ============================================================================

/// Handle to a realtime event channel.
///
/// Cheap to clone; clones share subscriptions and the connection.
/// Nothing here blocks or returns an error: sends while disconnected are
/// queued, and transport failures surface as lifecycle events.
#[derive(Clone)]
pub struct Channel {
    manager: ConnectionManager,
    events: EventBus,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("manager", &self.manager)
            .field("events", &self.events)
            .finish()
    }
}

// ============================================================================
// Channel - Constructor
// ============================================================================

impl Channel {
    /// Creates a builder for configuring a channel.
    #[inline]
    #[must_use]
    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    pub(crate) fn new(manager: ConnectionManager, events: EventBus) -> Self {
        Self { manager, events }
    }
}

// ============================================================================
// Channel - Subscriptions
// ============================================================================

impl Channel {
    /// Registers `handler` for `event`.
    ///
    /// The caller owns the returned id and must pass it to
    /// [`unsubscribe`](Self::unsubscribe) on teardown, or use
    /// [`subscriptions`](Self::subscriptions) instead.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(event, handler)
    }

    /// Removes subscription `id` from `event`. Unknown ids are a no-op.
    pub fn unsubscribe(&self, event: &str, id: SubscriptionId) -> bool {
        self.events.off(event, id)
    }

    /// Creates a guard that removes its subscriptions when dropped.
    #[must_use]
    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions {
            events: self.events.clone(),
            registered: Vec::new(),
        }
    }
}

// ============================================================================
// Channel - Commands
// ============================================================================

impl Channel {
    /// Sends a named command, queueing it if the channel is not connected.
    pub fn send(&self, name: impl Into<String>, payload: Option<Payload>) {
        self.send_command(Command::new(name, payload));
    }

    /// Sends a prepared command.
    pub fn send_command(&self, command: Command) {
        self.manager.send(command);
    }

    /// Starts receiving events for `task_id`.
    pub fn subscribe_to_task(&self, task_id: &TaskId) {
        self.send_command(Command::subscribe_task(task_id));
    }

    /// Stops receiving events for `task_id`.
    pub fn unsubscribe_from_task(&self, task_id: &TaskId) {
        self.send_command(Command::unsubscribe_task(task_id));
    }

    /// Starts receiving events for `session_id`.
    pub fn subscribe_to_session(&self, session_id: &SessionId) {
        self.send_command(Command::subscribe_session(session_id));
    }

    /// Stops receiving events for `session_id`.
    pub fn unsubscribe_from_session(&self, session_id: &SessionId) {
        self.send_command(Command::unsubscribe_session(session_id));
    }

    /// Sends a `ping`; the server answers with `pong`.
    pub fn ping(&self) {
        self.send_command(Command::ping());
    }
}

// ============================================================================
// Channel - Connection
// ============================================================================

impl Channel {
    /// Connects using the configured token provider.
    pub fn connect(&self) {
        self.manager.connect();
    }

    /// Connects to `endpoint` first and/or with an explicit `token`.
    pub fn connect_with(&self, endpoint: Option<Endpoint>, token: Option<String>) {
        self.manager.connect_with(endpoint, token);
    }

    /// Closes the connection and cancels pending reconnects.
    pub fn disconnect(&self) {
        self.manager.disconnect();
    }

    /// Reconnects, typically after login or logout.
    pub fn refresh(&self, token: Option<String>) {
        self.manager.refresh(token);
    }

    /// Returns `{connected, reconnectAttempts}`.
    #[inline]
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        self.manager.status()
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    /// Returns the endpoint currently targeted.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.manager.endpoint()
    }

    /// Returns the resolved candidate endpoints.
    #[inline]
    #[must_use]
    pub fn candidates(&self) -> &CandidateList {
        self.manager.candidates()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Subscriptions owned by one component.
///
/// Every handler registered through the guard is removed by
/// [`clear`](Self::clear) or when the guard is dropped.
pub struct Subscriptions {
    events: EventBus,
    registered: Vec<(String, SubscriptionId)>,
}

impl Subscriptions {
    /// Registers `handler` for `event` under this guard.
    pub fn subscribe<F>(&mut self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.events.on(event, handler);
        self.registered.push((event.to_string(), id));
        id
    }

    /// Removes every handler registered through this guard.
    pub fn clear(&mut self) {
        for (event, id) in self.registered.drain(..) {
            self.events.off(&event, id);
        }
    }

    /// Returns the number of live subscriptions held.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    /// Returns `true` if the guard holds nothing.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("registered", &self.registered)
            .finish()
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.clear();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use parking_lot::Mutex;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout};
    use tokio_tungstenite::tungstenite::Message;

    use crate::auth::SharedToken;
    use crate::config::ChannelOptions;
    use crate::protocol::names;
    use crate::transport::Connector;
    use crate::transport::mock::MockConnector;

    fn mock_channel(tokens: &SharedToken, connector: &Arc<MockConnector>) -> Channel {
        Channel::builder()
            .candidates(
                CandidateList::from_endpoints([Endpoint::parse("wss://a").expect("endpoint")])
                    .expect("candidates"),
            )
            .token_provider(tokens.clone())
            .connector(Arc::clone(connector) as Arc<dyn Connector>)
            .build()
            .expect("build")
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_before_connect() {
        let channel = mock_channel(&SharedToken::new(), &MockConnector::accepting());
        assert_eq!(channel.status(), ChannelStatus {
            connected: false,
            reconnect_attempts: 0,
        });
        assert_eq!(
            serde_json::to_value(channel.status()).expect("json"),
            json!({ "connected": false, "reconnectAttempts": 0 })
        );
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_helpers_send_expected_frames() {
        let tokens = SharedToken::with_token("t");
        let connector = MockConnector::accepting();
        let channel = mock_channel(&tokens, &connector);

        channel.subscribe_to_task(&TaskId::new("7"));
        channel.connect();
        settle().await;

        channel.unsubscribe_from_task(&TaskId::new("7"));
        channel.subscribe_to_session(&SessionId::new("s-1"));
        channel.unsubscribe_from_session(&SessionId::new("s-1"));
        channel.ping();
        channel.send("custom", None);
        settle().await;

        let mut remote = connector.take_remote();
        assert_eq!(remote.received(), vec![
            r#"{"type":"subscribe_task","task_id":"7"}"#,
            r#"{"type":"unsubscribe_task","task_id":"7"}"#,
            r#"{"type":"subscribe_session","session_id":"s-1"}"#,
            r#"{"type":"unsubscribe_session","session_id":"s-1"}"#,
            r#"{"type":"ping"}"#,
            r#"{"type":"custom"}"#,
        ]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_receives_inbound_events() {
        let tokens = SharedToken::with_token("t");
        let connector = MockConnector::accepting();
        let channel = mock_channel(&tokens, &connector);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let id = {
            let seen = Arc::clone(&seen);
            channel.subscribe(names::NOTIFICATION, move |payload| {
                seen.lock().push(payload["text"].clone());
            })
        };

        channel.connect();
        settle().await;
        let remote = connector.take_remote();

        remote.push(r#"{"type":"notification","text":"one"}"#);
        settle().await;
        assert!(channel.unsubscribe(names::NOTIFICATION, id));
        remote.push(r#"{"type":"notification","text":"two"}"#);
        settle().await;

        assert_eq!(*seen.lock(), vec![json!("one")]);
        assert!(!channel.unsubscribe(names::NOTIFICATION, id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_subscribers_see_active_tasks() {
        let tokens = SharedToken::with_token("t");
        let connector = MockConnector::accepting();
        let channel = mock_channel(&tokens, &connector);

        let beats = Arc::new(Mutex::new(0usize));
        {
            let beats = Arc::clone(&beats);
            channel.subscribe(names::HEARTBEAT, move |_| *beats.lock() += 1);
        }

        channel.connect();
        settle().await;
        let remote = connector.take_remote();
        remote.push(r#"{"type":"heartbeat"}"#);
        remote.push(r#"{"type":"active_tasks","tasks":[]}"#);
        settle().await;

        assert_eq!(*beats.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_guard_removes_on_drop() {
        let channel = mock_channel(&SharedToken::new(), &MockConnector::accepting());
        let events = channel.events.clone();

        {
            let mut guard = channel.subscriptions();
            guard.subscribe(names::TASK_STARTED, |_| {});
            guard.subscribe(names::TASK_COMPLETED, |_| {});
            guard.subscribe(names::TASK_COMPLETED, |_| {});
            assert_eq!(guard.len(), 3);
            assert_eq!(events.handler_count(names::TASK_COMPLETED), 2);
        }

        assert_eq!(events.handler_count(names::TASK_STARTED), 0);
        assert_eq!(events.handler_count(names::TASK_COMPLETED), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscriptions_clear_keeps_foreign_handlers() {
        let channel = mock_channel(&SharedToken::new(), &MockConnector::accepting());
        let foreign = channel.subscribe(names::TASK_FAILED, |_| {});

        let mut guard = channel.subscriptions();
        guard.subscribe(names::TASK_FAILED, |_| {});
        guard.clear();

        assert!(guard.is_empty());
        assert_eq!(channel.events.handler_count(names::TASK_FAILED), 1);
        assert!(channel.unsubscribe(names::TASK_FAILED, foreign));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_may_send_during_delivery() {
        let tokens = SharedToken::with_token("t");
        let connector = MockConnector::accepting();
        let channel = mock_channel(&tokens, &connector);

        {
            let inner = channel.clone();
            channel.subscribe(names::TASK_STARTED, move |payload| {
                if let Some(id) = payload["task_id"].as_str() {
                    inner.subscribe_to_task(&TaskId::new(id));
                }
            });
        }

        channel.connect();
        settle().await;
        let mut remote = connector.take_remote();
        remote.push(r#"{"type":"task_started","task_id":"9"}"#);
        settle().await;

        assert_eq!(remote.received(), vec![r#"{"type":"subscribe_task","task_id":"9"}"#]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_with_pins_endpoint() {
        let tokens = SharedToken::with_token("t");
        let connector = MockConnector::accepting();
        let channel = mock_channel(&tokens, &connector);

        let pinned = Endpoint::parse("ws://elsewhere:7000").expect("endpoint");
        channel.connect_with(Some(pinned.clone()), None);
        settle().await;

        assert_eq!(channel.endpoint(), pinned);
        assert_eq!(connector.attempt_hosts(), vec!["elsewhere"]);
        assert!(channel.status().connected);
    }

    // ------------------------------------------------------------------------
    // Loopback
    // ------------------------------------------------------------------------

    #[tokio::test]
    async fn test_end_to_end_over_websocket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let mut ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");

            let Some(Ok(Message::Text(text))) = ws.next().await else {
                panic!("expected a subscribe frame");
            };
            let frame = json!({
                "type": "progress_event",
                "event": { "task_id": "42", "progress": 75 },
            });
            ws.send(Message::Text(frame.to_string().into())).await.expect("send");
            ws.next().await;
            text.as_str().to_owned()
        });

        let channel = Channel::builder()
            .options(ChannelOptions::new().with_ws_url(format!("ws://127.0.0.1:{port}")))
            .token_provider(SharedToken::with_token("tok"))
            .build()
            .expect("build");

        let (progress_tx, progress_rx) = tokio::sync::oneshot::channel();
        let progress_tx = Mutex::new(Some(progress_tx));
        channel.subscribe(names::TASK_PROGRESS, move |payload| {
            if let Some(tx) = progress_tx.lock().take() {
                let _ = tx.send(payload.clone());
            }
        });

        channel.subscribe_to_task(&TaskId::new("42"));
        channel.connect();

        let payload = timeout(Duration::from_secs(5), progress_rx)
            .await
            .expect("progress in time")
            .expect("progress delivered");
        assert_eq!(payload, json!({ "task_id": "42", "progress": 75 }));
        assert!(channel.status().connected);

        channel.disconnect();
        let subscribe = timeout(Duration::from_secs(5), server)
            .await
            .expect("server done")
            .expect("server task");
        assert_eq!(subscribe, r#"{"type":"subscribe_task","task_id":"42"}"#);
    }
}
