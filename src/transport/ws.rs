//! WebSocket transport.
//!
//! Connects to a Chrome-Remote-Debugging-style endpoint and pumps
//! messages both ways from one event loop task:
//!
//! - Outgoing sends arrive over an internal command channel and go out on
//!   the socket in order.
//! - Each inbound text frame is handed to the registered message handler
//!   (the multiplexor's classifier). A handler error is a fatal protocol
//!   violation: it is logged with the payload and the loop terminates.
//! - `open`/`close`/`error` lifecycle events fan out to registered
//!   listeners, uninterpreted.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info};
use url::Url;

use crate::error::{Error, Result};
use crate::identifiers::SubscriptionId;

use super::{LifecycleHandler, MessageHandler, Transport, TransportEvent};

// ============================================================================
// Constants
// ============================================================================

/// Timeout for establishing the WebSocket connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Internal commands for the event loop.
enum WsCommand {
    /// Send one frame; `done_tx` resolves with the write result.
    Send {
        raw: String,
        done_tx: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop the loop.
    Shutdown,
}

// ============================================================================
// WsShared
// ============================================================================

/// State shared between the handle and the event loop task.
#[derive(Default)]
struct WsShared {
    /// Inbound message handler (the multiplexor's classifier).
    message_handler: Mutex<Option<MessageHandler>>,
    /// Lifecycle listeners by event.
    listeners: Mutex<FxHashMap<TransportEvent, Vec<(SubscriptionId, LifecycleHandler)>>>,
}

impl WsShared {
    /// Fans a lifecycle event out to its listeners.
    fn emit(&self, event: TransportEvent, detail: &str) {
        let handlers: Vec<LifecycleHandler> = self
            .listeners
            .lock()
            .get(&event)
            .map(|v| v.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        for handler in handlers {
            handler(detail);
        }
    }
}

// ============================================================================
// WsTransport
// ============================================================================

/// WebSocket implementation of [`Transport`].
///
/// Spawns its event loop task on construction; dropping the handle lets
/// the loop drain and stop once the command channel closes.
pub struct WsTransport {
    /// Channel into the event loop.
    command_tx: mpsc::UnboundedSender<WsCommand>,
    /// Handler and listener registries, shared with the loop.
    shared: Arc<WsShared>,
}

impl WsTransport {
    /// Connects to a `ws://` (or `wss://`) debugging endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Url`] if `url` does not parse
    /// - [`Error::Connection`] if the connection is not established within
    ///   30 s
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(url: &str) -> Result<Arc<Self>> {
        let url = Url::parse(url)?;

        let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
            .await
            .map_err(|_| {
                Error::connection(format!(
                    "timed out after {}s connecting to {url}",
                    CONNECT_TIMEOUT.as_secs()
                ))
            })??;

        info!(%url, "WebSocket connection established");
        Ok(Self::from_stream(ws_stream))
    }

    /// Wraps an already established stream.
    pub(crate) fn from_stream(ws_stream: WsStream) -> Arc<Self> {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WsShared::default());

        tokio::spawn(Self::run_event_loop(
            ws_stream,
            command_rx,
            Arc::clone(&shared),
        ));

        Arc::new(Self { command_tx, shared })
    }

    /// Shuts the connection down gracefully.
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(WsCommand::Shutdown);
    }

    /// Event loop that owns the socket.
    async fn run_event_loop(
        ws_stream: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<WsCommand>,
        shared: Arc<WsShared>,
    ) {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        shared.emit(TransportEvent::Open, "");

        loop {
            tokio::select! {
                // Inbound frames from the runtime
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let handler = shared.message_handler.lock();
                            if let Some(ref handler) = *handler
                                && let Err(err) = handler(text.as_str())
                            {
                                error!(%err, "Fatal protocol violation, closing transport");
                                break;
                            }
                        }

                        Some(Ok(Message::Close(_))) => {
                            debug!("WebSocket closed by remote");
                            shared.emit(TransportEvent::Close, "closed by remote");
                            break;
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            shared.emit(TransportEvent::Error, &e.to_string());
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            shared.emit(TransportEvent::Close, "stream ended");
                            break;
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Outgoing frames from the multiplexor
                command = command_rx.recv() => {
                    match command {
                        Some(WsCommand::Send { raw, done_tx }) => {
                            let result = ws_write
                                .send(Message::Text(raw.into()))
                                .await
                                .map_err(Error::from);
                            let _ = done_tx.send(result);
                        }

                        Some(WsCommand::Shutdown) => {
                            debug!("Shutdown command received");
                            let _ = ws_write.close().await;
                            shared.emit(TransportEvent::Close, "local shutdown");
                            break;
                        }

                        None => {
                            debug!("Command channel closed");
                            break;
                        }
                    }
                }
            }
        }

        debug!("Event loop terminated");
    }
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport")
            .field("command_channel_open", &!self.command_tx.is_closed())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&self, raw: String) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();

        self.command_tx
            .send(WsCommand::Send { raw, done_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        done_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn set_message_handler(&self, handler: MessageHandler) {
        *self.shared.message_handler.lock() = Some(handler);
    }

    fn add_listener(&self, event: TransportEvent, handler: LifecycleHandler) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.shared
            .listeners
            .lock()
            .entry(event)
            .or_default()
            .push((id, handler));
        id
    }

    fn remove_listener(&self, event: TransportEvent, id: SubscriptionId) -> bool {
        let mut listeners = self.shared.listeners.lock();
        let Some(entries) = listeners.get_mut(&event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }
}

// ============================================================================
// Tests
// ============================================================================
