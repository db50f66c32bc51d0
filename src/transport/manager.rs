//! Connection manager.
//!
//! Owns the single transport of a channel and drives it through
//! `Disconnected → Connecting → Connected → Disconnected`.
//!
//! # Policy
//!
//! | Situation | Reaction |
//! |-----------|----------|
//! | `connect` without a token | stay disconnected, poll the token every `token_retry_delay` |
//! | `connect` while open or opening | no-op |
//! | transport opened | retry counter reset, outbound queue flushed |
//! | transport closed, token present | retry after `base_delay * n`, `n` = consecutive failures |
//! | `max_attempts_per_endpoint` failures | rotate to the next candidate |
//! | every candidate exhausted | `max_reconnect_exceeded`, stop |
//! | transport closed, token gone | stop until `connect` |
//! | `disconnect` | cancel every timer, release the transport |
//!
//! All transitions happen under one lock. Subscribers are always invoked
//! after it is released, so handlers may call back into the channel.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, trace, warn};

use crate::auth::{self, TokenProvider};
use crate::config::ChannelOptions;
use crate::endpoint::{CandidateList, Endpoint};
use crate::events::EventBus;
use crate::protocol::{Command, InboundMessage, names};

use super::connection::{Connector, Link, LinkObserver};
use super::queue::OutboundQueue;

// ============================================================================
// Constants
// ============================================================================

/// Longest inbound frame excerpt written to logs.
const LOG_EXCERPT_LEN: usize = 120;

// ============================================================================
// Public Types
// ============================================================================

/// Transport lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No transport, possibly waiting on a timer.
    Disconnected,
    /// Transport is being opened.
    Connecting,
    /// Transport is open.
    Connected,
}

/// Connection status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    /// Whether the transport is open.
    pub connected: bool,
    /// Consecutive failed attempts against the current endpoint.
    pub reconnect_attempts: u32,
}

// ============================================================================
// Internal State
// ============================================================================

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    /// Backoff after a failure.
    Reconnect,
    /// Waiting for a token to show up.
    TokenRetry,
}

/// Lifecycle event published once the lock is released.
type Notice = (&'static str, Value);

/// Bookkeeping guarded by the manager lock.
struct ManagerState {
    phase: ConnectionState,
    /// Consecutive failures against the current target.
    retry_count: u32,
    /// Index into the candidate list.
    cursor: usize,
    /// Rotations since the last successful open.
    rotations: usize,
    /// Endpoint passed to `connect_with`, tried before the candidate list.
    pinned: Option<Endpoint>,
    /// Bumped on every attempt and on `disconnect`; stale callbacks compare it.
    generation: u64,
    link: Option<Link>,
    reconnect_timer: Option<JoinHandle<()>>,
    token_timer: Option<JoinHandle<()>>,
    queue: OutboundQueue,
    /// Total transports attempted over the manager's life.
    attempts: u64,
}

impl ManagerState {
    fn target<'a>(&'a self, candidates: &'a CandidateList) -> &'a Endpoint {
        self.pinned
            .as_ref()
            .unwrap_or_else(|| candidates.get(self.cursor))
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.token_timer.take() {
            timer.abort();
        }
    }

    /// Whether a failing target can be abandoned for another candidate.
    fn can_rotate(&self, candidates: &CandidateList) -> bool {
        self.pinned.is_some() || self.rotations + 1 < candidates.len()
    }

    /// Moves to the next target and resets the failure count.
    fn rotate(&mut self, candidates: &CandidateList) {
        if self.pinned.take().is_none() {
            self.cursor = (self.cursor + 1) % candidates.len();
            self.rotations += 1;
        }
        self.retry_count = 0;
    }
}

struct ManagerInner {
    options: ChannelOptions,
    candidates: CandidateList,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    events: EventBus,
    runtime: Handle,
    state: Mutex<ManagerState>,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.state.get_mut().cancel_timers();
    }
}

// ============================================================================
// ConnectionManager
// ============================================================================

/// Reconnecting owner of the channel transport.
///
/// Cheap to clone; clones drive the same transport.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ConnectionManager")
            .field("state", &state.phase)
            .field("endpoint", &state.target(&self.inner.candidates).as_str())
            .field("retry_count", &state.retry_count)
            .field("queued", &state.queue.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ConnectionManager - Constructor
// ============================================================================

impl ConnectionManager {
    /// Creates a disconnected manager.
    ///
    /// Timers and transports are spawned on `runtime`.
    pub(crate) fn new(
        options: ChannelOptions,
        candidates: CandidateList,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
        events: EventBus,
        runtime: Handle,
    ) -> Self {
        let state = ManagerState {
            phase: ConnectionState::Disconnected,
            retry_count: 0,
            cursor: 0,
            rotations: 0,
            pinned: None,
            generation: 0,
            link: None,
            reconnect_timer: None,
            token_timer: None,
            queue: OutboundQueue::new(options.queue_capacity),
            attempts: 0,
        };

        Self {
            inner: Arc::new(ManagerInner {
                options,
                candidates,
                tokens,
                connector,
                events,
                runtime,
                state: Mutex::new(state),
            }),
        }
    }

    fn from_weak(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }
}

// ============================================================================
// ConnectionManager - Public API
// ============================================================================

impl ConnectionManager {
    /// Connects to the current target with the provider's token.
    pub fn connect(&self) {
        self.connect_with(None, None);
    }

    /// Connects, optionally pinning an endpoint and supplying a token.
    ///
    /// A supplied token is used for this attempt only; later attempts ask
    /// the provider again. Without any token the manager stays
    /// disconnected and polls the provider. If a transport is open or
    /// opening, the call is ignored, endpoint included.
    pub fn connect_with(&self, endpoint: Option<Endpoint>, token: Option<String>) {
        let token = token
            .filter(|t| !t.trim().is_empty())
            .or_else(|| auth::resolve(&*self.inner.tokens));

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if state.phase != ConnectionState::Disconnected {
            debug!(state = ?state.phase, "Connect ignored, transport already open or opening");
            return;
        }

        if let Some(endpoint) = endpoint {
            state.pinned = Some(endpoint);
        }

        state.cancel_timers();
        state.retry_count = 0;
        state.rotations = 0;
        self.attempt(state, token);
    }

    /// Closes the transport and cancels every pending timer.
    ///
    /// Queued commands are kept for the next connection.
    pub fn disconnect(&self) {
        let notice = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            state.generation += 1;
            state.cancel_timers();
            state.retry_count = 0;
            state.rotations = 0;

            let previous = state.phase;
            state.phase = ConnectionState::Disconnected;

            if let Some(link) = state.link.take() {
                match previous {
                    ConnectionState::Connecting => link.abort(),
                    _ => link.release(),
                }
            }

            (previous != ConnectionState::Disconnected).then(|| {
                let endpoint = state.target(&self.inner.candidates);
                info!(endpoint = %endpoint, "Channel disconnected by client");
                (
                    names::DISCONNECTED,
                    json!({ "endpoint": endpoint.as_str(), "reason": "client" }),
                )
            })
        };

        self.publish(notice);
    }

    /// Reconnects under fresh credentials.
    ///
    /// Equivalent to [`disconnect`](Self::disconnect) followed by
    /// [`connect_with`](Self::connect_with) against the current target.
    pub fn refresh(&self, token: Option<String>) {
        self.disconnect();
        self.connect_with(None, token);
    }

    /// Sends a command now if connected, otherwise queues it.
    pub fn send(&self, command: Command) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let command = match (&state.link, state.phase) {
            (Some(link), ConnectionState::Connected) => match link.send(command) {
                Ok(()) => return,
                Err(command) => command,
            },
            _ => command,
        };

        state.queue.enqueue(command);
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().phase
    }

    /// Returns the status snapshot.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        let state = self.inner.state.lock();
        ChannelStatus {
            connected: state.phase == ConnectionState::Connected,
            reconnect_attempts: state.retry_count,
        }
    }

    /// Returns the endpoint the next (or current) attempt targets.
    #[must_use]
    pub fn endpoint(&self) -> Endpoint {
        self.inner
            .state
            .lock()
            .target(&self.inner.candidates)
            .clone()
    }

    /// Returns the candidate list.
    #[inline]
    #[must_use]
    pub fn candidates(&self) -> &CandidateList {
        &self.inner.candidates
    }

    /// Returns the number of queued commands.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.state.lock().queue.len()
    }

    /// Returns how many transports have been attempted in total.
    #[must_use]
    pub fn total_attempts(&self) -> u64 {
        self.inner.state.lock().attempts
    }

    /// Whether a backoff reconnect is scheduled.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.state.lock().reconnect_timer.is_some()
    }

    /// Whether the manager is polling for a token.
    #[must_use]
    pub fn token_retry_pending(&self) -> bool {
        self.inner.state.lock().token_timer.is_some()
    }
}

// ============================================================================
// ConnectionManager - Transitions
// ============================================================================

impl ConnectionManager {
    /// Opens a transport to the current target, or waits for a token.
    ///
    /// Caller holds the lock and has checked the phase is `Disconnected`.
    fn attempt(&self, state: &mut ManagerState, token: Option<String>) {
        let endpoint = state.target(&self.inner.candidates).clone();

        let Some(token) = token else {
            debug!(
                endpoint = %endpoint,
                delay_ms = self.inner.options.token_retry_delay.as_millis() as u64,
                "No token yet, deferring channel connection"
            );
            self.schedule(state, TimerKind::TokenRetry, self.inner.options.token_retry_delay);
            return;
        };

        state.generation += 1;
        state.attempts += 1;
        state.phase = ConnectionState::Connecting;

        info!(
            endpoint = %endpoint,
            attempt = state.retry_count + 1,
            "Opening channel"
        );

        let observer = LinkHandle {
            manager: Arc::downgrade(&self.inner),
            generation: state.generation,
        };
        let url = endpoint.with_token(&token);

        state.link = Some(Link::spawn(
            &self.inner.runtime,
            Arc::clone(&self.inner.connector),
            endpoint,
            url,
            observer,
        ));
    }

    /// Arms a timer; the callback is ignored if the generation moved on.
    fn schedule(&self, state: &mut ManagerState, kind: TimerKind, delay: Duration) {
        let manager = Arc::downgrade(&self.inner);
        let generation = state.generation;

        let timer = self.inner.runtime.spawn(async move {
            sleep(delay).await;
            if let Some(manager) = ConnectionManager::from_weak(&manager) {
                manager.on_timer(kind, generation);
            }
        });

        let slot = match kind {
            TimerKind::Reconnect => &mut state.reconnect_timer,
            TimerKind::TokenRetry => &mut state.token_timer,
        };
        if let Some(previous) = slot.replace(timer) {
            previous.abort();
        }
    }

    fn on_timer(&self, kind: TimerKind, generation: u64) {
        let token = auth::resolve(&*self.inner.tokens);

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        if state.generation != generation || state.phase != ConnectionState::Disconnected {
            trace!(?kind, "Stale timer ignored");
            return;
        }

        match kind {
            TimerKind::Reconnect => state.reconnect_timer = None,
            TimerKind::TokenRetry => state.token_timer = None,
        }

        if kind == TimerKind::Reconnect && token.is_none() {
            info!("Credentials gone, reconnection suspended until connect");
            return;
        }

        self.attempt(state, token);
    }

    fn handle_open(&self, generation: u64) -> bool {
        let notice = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            if state.generation != generation || state.phase != ConnectionState::Connecting {
                return false;
            }

            state.phase = ConnectionState::Connected;
            state.retry_count = 0;
            state.rotations = 0;

            let flushed = match &state.link {
                Some(link) => state.queue.drain(|command| link.send(command)),
                None => 0,
            };

            let endpoint = state.target(&self.inner.candidates);
            info!(endpoint = %endpoint, flushed, "Channel connected");
            (names::CONNECTED, json!({ "endpoint": endpoint.as_str() }))
        };

        self.publish(Some(notice));
        true
    }

    fn handle_frame(&self, generation: u64, text: &str) {
        {
            let state = self.inner.state.lock();
            if state.generation != generation || state.phase != ConnectionState::Connected {
                trace!("Frame from a released transport dropped");
                return;
            }
        }

        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, frame = excerpt(text), "Dropping undecodable frame");
                return;
            }
        };

        trace!(kind = ?message.kind, "Frame received");
        for name in message.routes() {
            self.inner.events.emit(name, &message.payload);
        }
    }

    fn handle_closed(&self, generation: u64, unsent: Vec<Command>) {
        let token_available = auth::resolve(&*self.inner.tokens).is_some();
        let mut notices: Vec<Notice> = Vec::new();

        {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;

            state.queue.requeue_front(unsent);

            if state.generation != generation {
                return;
            }

            let was_connected = state.phase == ConnectionState::Connected;
            state.phase = ConnectionState::Disconnected;
            state.link = None;

            let endpoint = state.target(&self.inner.candidates).clone();
            notices.push((
                names::DISCONNECTED,
                json!({
                    "endpoint": endpoint.as_str(),
                    "reason": if was_connected { "closed" } else { "failed" },
                }),
            ));

            if token_available {
                self.plan_reconnect(state, endpoint, &mut notices);
            } else {
                info!(endpoint = %endpoint, "Channel closed without credentials, not reconnecting");
            }
        }

        for notice in notices {
            self.publish(Some(notice));
        }
    }

    /// Schedules the next attempt after a failure, rotating or giving up
    /// when the current target is exhausted.
    fn plan_reconnect(&self, state: &mut ManagerState, endpoint: Endpoint, notices: &mut Vec<Notice>) {
        let options = &self.inner.options;
        let candidates = &self.inner.candidates;

        state.retry_count += 1;

        if state.retry_count < options.max_attempts_per_endpoint {
            let delay = backoff_delay(options.base_delay, state.retry_count);
            debug!(
                endpoint = %endpoint,
                attempt = state.retry_count,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );
            self.schedule(state, TimerKind::Reconnect, delay);
            notices.push((
                names::RECONNECTING,
                json!({
                    "endpoint": endpoint.as_str(),
                    "attempt": state.retry_count,
                    "delay_ms": delay.as_millis() as u64,
                }),
            ));
            return;
        }

        if !state.can_rotate(candidates) {
            error!(
                endpoint = %endpoint,
                attempts = state.retry_count,
                "Channel unreachable on every candidate, giving up"
            );
            notices.push((
                names::MAX_RECONNECT_EXCEEDED,
                json!({ "endpoint": endpoint.as_str(), "attempts": state.retry_count }),
            ));
            return;
        }

        state.rotate(candidates);
        let next = state.target(candidates).clone();
        warn!(
            from = %endpoint,
            to = %next,
            attempts = options.max_attempts_per_endpoint,
            "Endpoint unreachable, rotating to next candidate"
        );

        self.schedule(state, TimerKind::Reconnect, options.base_delay);
        notices.push((
            names::ENDPOINT_ROTATED,
            json!({ "from": endpoint.as_str(), "to": next.as_str() }),
        ));
        notices.push((
            names::RECONNECTING,
            json!({
                "endpoint": next.as_str(),
                "attempt": 0,
                "delay_ms": options.base_delay.as_millis() as u64,
            }),
        ));
    }

    fn publish(&self, notice: Option<Notice>) {
        if let Some((name, payload)) = notice {
            self.inner.events.emit(name, &payload);
        }
    }
}

/// Linear backoff, saturating instead of overflowing.
fn backoff_delay(base: Duration, failures: u32) -> Duration {
    base.checked_mul(failures).unwrap_or(Duration::MAX)
}

/// Truncates a frame for logging on a character boundary.
fn excerpt(text: &str) -> &str {
    match text.char_indices().nth(LOG_EXCERPT_LEN) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

// ============================================================================
// LinkHandle
// ============================================================================

/// Routes one link's callbacks back to its manager.
struct LinkHandle {
    manager: Weak<ManagerInner>,
    generation: u64,
}

impl LinkObserver for LinkHandle {
    fn opened(&self) -> bool {
        ConnectionManager::from_weak(&self.manager)
            .is_some_and(|manager| manager.handle_open(self.generation))
    }

    fn frame(&self, text: &str) {
        if let Some(manager) = ConnectionManager::from_weak(&self.manager) {
            manager.handle_frame(self.generation, text);
        }
    }

    fn closed(&self, unsent: Vec<Command>) {
        if let Some(manager) = ConnectionManager::from_weak(&self.manager) {
            manager.handle_closed(self.generation, unsent);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
