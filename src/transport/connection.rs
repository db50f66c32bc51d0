//! Transport seam and per-connection event loop.
//!
//! A [`Connector`] opens a [`Transport`] (a text-frame sink plus a
//! text-frame source). [`Link`] owns one transport inside a spawned task
//! and reports back through a [`LinkObserver`]:
//!
//! ```text
//!  ConnectionManager ──Command──► Link task ──text frame──► server
//!         ▲                          │
//!         └── opened / frame / closed ◄── text frame ── server
//! ```
//!
//! # Event Loop
//!
//! The link task:
//!
//! - opens the transport and asks the observer whether it is still wanted
//! - forwards inbound text frames to the observer
//! - encodes and writes outbound commands in arrival order
//! - on failure, hands every command it did not write back to the observer
//! - on release (command sender dropped), flushes pending commands and
//!   closes the transport without reporting a close

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};
use url::Url;

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::protocol::Command;

// ============================================================================
// Transport Traits
// ============================================================================

/// Write half of a transport.
#[async_trait]
pub trait FrameSink: Send {
    /// Writes one text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Closes the transport gracefully.
    async fn close(&mut self) -> Result<()>;
}

/// Read half of a transport.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next text frame. `None` means the transport closed.
    ///
    /// Must be cancel-safe: dropping the future may not lose a frame.
    async fn next_text(&mut self) -> Option<Result<String>>;
}

/// An open bidirectional text transport.
pub struct Transport {
    sink: Box<dyn FrameSink>,
    source: Box<dyn FrameSource>,
}

impl Transport {
    /// Wraps a sink/source pair.
    #[must_use]
    pub fn new(sink: impl FrameSink + 'static, source: impl FrameSource + 'static) -> Self {
        Self {
            sink: Box::new(sink),
            source: Box::new(source),
        }
    }
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Opens a transport to `url` (token already attached).
    async fn connect(&self, url: &Url) -> Result<Transport>;
}

// ============================================================================
// WebSocket Connector
// ============================================================================

/// Client WebSocket stream.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
///
/// `wss://` endpoints need one of the crate's TLS features.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Transport> {
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!(status = %response.status(), "WebSocket handshake completed");

        let (sink, source) = stream.split();
        Ok(Transport::new(WsSink(sink), WsSource(source)))
    }
}

struct WsSink(SplitSink<WsStream, Message>);

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.0.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.0.close().await?;
        Ok(())
    }
}

struct WsSource(SplitStream<WsStream>);

#[async_trait]
impl FrameSource for WsSource {
    async fn next_text(&mut self) -> Option<Result<String>> {
        loop {
            match self.0.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }
                // Binary, Ping, Pong and raw frames carry no channel data.
                Ok(_) => continue,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }
}

// ============================================================================
// LinkObserver
// ============================================================================

/// Receives the lifecycle of one link.
pub(crate) trait LinkObserver: Send + Sync + 'static {
    /// Transport opened. Returning `false` closes it immediately.
    fn opened(&self) -> bool;

    /// An inbound text frame arrived.
    fn frame(&self, text: &str);

    /// Transport failed or closed; `unsent` were accepted but not written.
    fn closed(&self, unsent: Vec<Command>);
}

// ============================================================================
// Link
// ============================================================================

/// Handle to a spawned connection task.
pub(crate) struct Link {
    /// Commands for the event loop, written in order.
    outbound: mpsc::UnboundedSender<Command>,
    /// The event loop task.
    task: JoinHandle<()>,
}

impl Link {
    /// Spawns a task connecting to `url` and running the event loop.
    pub(crate) fn spawn<O: LinkObserver>(
        runtime: &Handle,
        connector: Arc<dyn Connector>,
        endpoint: Endpoint,
        url: Url,
        observer: O,
    ) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(run_link(connector, endpoint, url, observer, outbound_rx));
        Self { outbound, task }
    }

    /// Hands a command to the event loop, or returns it if the loop is gone.
    pub(crate) fn send(&self, command: Command) -> std::result::Result<(), Command> {
        self.outbound.send(command).map_err(|e| e.0)
    }

    /// Lets the loop flush what it holds and close the transport.
    pub(crate) fn release(self) {
        drop(self.outbound);
    }

    /// Stops the task outright. Used while still connecting.
    pub(crate) fn abort(self) {
        self.task.abort();
    }
}

/// Connection task body.
async fn run_link<O: LinkObserver>(
    connector: Arc<dyn Connector>,
    endpoint: Endpoint,
    url: Url,
    observer: O,
    mut outbound_rx: mpsc::UnboundedReceiver<Command>,
) {
    let Transport {
        mut sink,
        mut source,
    } = match connector.connect(&url).await {
        Ok(transport) => transport,
        Err(e) => {
            warn!(endpoint = %endpoint, error = %e, "Channel connection failed");
            observer.closed(Vec::new());
            return;
        }
    };

    if !observer.opened() {
        debug!(endpoint = %endpoint, "Transport no longer wanted, closing");
        let _ = sink.close().await;
        return;
    }

    let mut unsent = Vec::new();

    loop {
        tokio::select! {
            frame = source.next_text() => {
                match frame {
                    Some(Ok(text)) => observer.frame(&text),

                    Some(Err(e)) => {
                        warn!(endpoint = %endpoint, error = %e, "Channel transport error");
                        break;
                    }

                    None => {
                        info!(endpoint = %endpoint, "Channel closed by server");
                        break;
                    }
                }
            }

            command = outbound_rx.recv() => {
                match command {
                    Some(command) => {
                        let frame = match command.to_frame() {
                            Ok(frame) => frame,
                            Err(e) => {
                                warn!(command = %command.name, error = %e, "Dropping unencodable command");
                                continue;
                            }
                        };

                        if let Err(e) = sink.send_text(frame).await {
                            warn!(endpoint = %endpoint, error = %e, "Channel write failed");
                            unsent.push(command);
                            break;
                        }

                        trace!(command = %command.name, "Command sent");
                    }

                    None => {
                        debug!(endpoint = %endpoint, "Link released, closing transport");
                        let _ = sink.close().await;
                        return;
                    }
                }
            }
        }
    }

    // Whatever the manager handed over but we never wrote goes back.
    outbound_rx.close();
    while let Ok(command) = outbound_rx.try_recv() {
        unsent.push(command);
    }

    let _ = sink.close().await;
    observer.closed(unsent);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<String>>>,
        unsent: Arc<Mutex<Option<Vec<Command>>>>,
    }

    impl LinkObserver for Recorder {
        fn opened(&self) -> bool {
            true
        }

        fn frame(&self, text: &str) {
            self.frames.lock().push(text.to_string());
        }

        fn closed(&self, unsent: Vec<Command>) {
            *self.unsent.lock() = Some(unsent);
        }
    }

    /// Accepts one WebSocket client, reports its request path, echoes one
    /// text frame back and then closes.
    async fn echo_server() -> (u16, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let (path_tx, path_rx) = oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let callback = move |request: &Request,
                                 response: Response|
                  -> std::result::Result<Response, ErrorResponse> {
                let _ = path_tx.send(request.uri().to_string());
                Ok(response)
            };
            let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
                .await
                .expect("upgrade");

            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.expect("echo");
            }
            let _ = ws.close(None).await;
        });

        (port, path_rx)
    }

    #[tokio::test]
    async fn test_ws_connector_roundtrip() {
        let (port, path_rx) = echo_server().await;
        let endpoint = Endpoint::parse(&format!("ws://127.0.0.1:{port}")).expect("endpoint");
        let url = endpoint.with_token("tok-1");

        let recorder = Recorder::default();
        let link = Link::spawn(
            &Handle::current(),
            Arc::new(WsConnector),
            endpoint,
            url,
            recorder.clone(),
        );
        assert!(link.send(Command::ping()).is_ok());

        assert_eq!(path_rx.await.expect("path"), "/ws/global?token=tok-1");

        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while recorder.unsent.lock().is_none() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("link closed");

        assert_eq!(*recorder.frames.lock(), vec![r#"{"type":"ping"}"#.to_string()]);
        assert_eq!(recorder.unsent.lock().as_ref().map(Vec::len), Some(0));
    }

    #[tokio::test]
    async fn test_ws_connector_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let url = Url::parse(&format!("ws://127.0.0.1:{port}/ws/global")).expect("url");

        let result = WsConnector.connect(&url).await;
        assert!(matches!(result, Err(e) if e.is_connection_error()));
    }
}
