//! In-memory connector for tests.
//!
//! Every `connect` call is recorded. Accepted connections hand the test a
//! [`MockRemote`] playing the server side.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use url::Url;

use crate::error::{Error, Result};

use super::connection::{Connector, FrameSink, FrameSource, Transport};

// ============================================================================
// MockConnector
// ============================================================================

/// Connector whose server side is driven by the test.
#[derive(Default)]
pub(crate) struct MockConnector {
    attempts: Mutex<Vec<(Instant, Url)>>,
    refuse: AtomicBool,
    remotes: Mutex<VecDeque<MockRemote>>,
}

impl MockConnector {
    /// Connector that accepts every attempt.
    pub(crate) fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Connector that refuses every attempt.
    pub(crate) fn refusing() -> Arc<Self> {
        let connector = Self::default();
        connector.refuse.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    /// Switches between refusing and accepting.
    pub(crate) fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far.
    pub(crate) fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }

    /// Host of every attempted URL, in order.
    pub(crate) fn attempt_hosts(&self) -> Vec<String> {
        self.attempts
            .lock()
            .iter()
            .map(|(_, url)| url.host_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Time of every attempt, in order.
    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().iter().map(|(at, _)| *at).collect()
    }

    /// Full URL of the most recent attempt.
    pub(crate) fn last_url(&self) -> Option<Url> {
        self.attempts.lock().last().map(|(_, url)| url.clone())
    }

    /// Takes the server side of the oldest accepted connection.
    pub(crate) fn take_remote(&self) -> MockRemote {
        self.remotes
            .lock()
            .pop_front()
            .expect("no accepted connection")
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<Transport> {
        self.attempts.lock().push((Instant::now(), url.clone()));

        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("refused by mock"));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let closed_by_client = Arc::new(AtomicBool::new(false));

        self.remotes.lock().push_back(MockRemote {
            to_client: Some(to_client),
            from_client,
            closed_by_client: Arc::clone(&closed_by_client),
        });

        Ok(Transport::new(
            MockSink {
                tx: client_tx,
                closed: closed_by_client,
            },
            MockSource { rx: client_rx },
        ))
    }
}

// ============================================================================
// MockRemote
// ============================================================================

/// Server side of one mock connection.
pub(crate) struct MockRemote {
    to_client: Option<mpsc::UnboundedSender<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed_by_client: Arc<AtomicBool>,
}

impl MockRemote {
    /// Sends a text frame to the client.
    pub(crate) fn push(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(text.to_string());
        }
    }

    /// Closes the connection from the server side.
    pub(crate) fn close(&mut self) {
        self.to_client = None;
    }

    /// Frames written by the client so far.
    pub(crate) fn received(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// `type` of every frame written by the client so far.
    pub(crate) fn received_types(&mut self) -> Vec<String> {
        self.received()
            .iter()
            .filter_map(|frame| serde_json::from_str::<Value>(frame).ok())
            .filter_map(|value| value["type"].as_str().map(str::to_string))
            .collect()
    }

    /// Whether the client closed its side.
    pub(crate) fn closed_by_client(&self) -> bool {
        self.closed_by_client.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Transport halves
// ============================================================================

struct MockSink {
    tx: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.tx.send(text).map_err(|_| Error::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

struct MockSource {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn next_text(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }
}
