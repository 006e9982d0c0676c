//! Default WebSocket transport.
//!
//! A [`Transport`] implementation over tokio-tungstenite with automatic
//! reconnection. A spawned event-loop task owns the socket; the API side
//! talks to it through an mpsc command channel.
//!
//! # Event Loop
//!
//! The loop handles:
//!
//! - Inbound frames, forwarded to the installed [`TransportHandler`]
//! - Outbound sends from [`Transport::send_json`]
//! - Reconnect and disconnect commands
//! - Redial with exponential backoff after a dropped connection

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportHandler};

use async_trait::async_trait;

// ============================================================================
// Constants
// ============================================================================

/// Initial delay before redialing a dropped connection.
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Upper bound for the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type HandlerSlot = Arc<RwLock<Option<Arc<dyn TransportHandler>>>>;

/// Internal commands for the event loop.
enum TransportCommand {
    /// Transmit a serialized frame.
    Send {
        text: String,
        result_tx: oneshot::Sender<Result<()>>,
    },
    /// Drop the current socket and redial.
    Reconnect,
    /// Tear down without redialing.
    Disconnect,
}

/// Outcome of one connected session, steering the outer loop.
enum SessionEnd {
    /// Socket dropped or reconnect requested; redial.
    Redial,
    /// Disconnect requested or command channel closed; exit.
    Shutdown,
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// WebSocket transport with automatic reconnection.
///
/// # Thread Safety
///
/// `WebSocketTransport` is `Send + Sync`; all operations go through the
/// internal command channel and are safe to call concurrently.
pub struct WebSocketTransport {
    /// Endpoint URL.
    url: Url,

    /// Extra headers attached to the connection handshake.
    headers: HeaderMap,

    /// Liveness flag (shared with the event loop).
    connected: Arc<AtomicBool>,

    /// Inbound hook set (shared with the event loop).
    handler: HandlerSlot,

    /// Channel to the event loop; `None` until started or after forced
    /// disconnect.
    command_tx: Mutex<Option<mpsc::UnboundedSender<TransportCommand>>>,
}

impl WebSocketTransport {
    /// Creates a transport for the given endpoint.
    ///
    /// No connection is attempted until [`Transport::connect`] is called.
    #[must_use]
    pub fn new(url: Url, headers: HeaderMap) -> Self {
        Self {
            url,
            headers,
            connected: Arc::new(AtomicBool::new(false)),
            handler: Arc::new(RwLock::new(None)),
            command_tx: Mutex::new(None),
        }
    }

    /// Dials the endpoint once.
    async fn dial(url: &Url, headers: &HeaderMap) -> Result<WsStream> {
        let mut request = url.as_str().into_client_request()?;
        request.headers_mut().extend(headers.clone());

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| Error::connection(e.to_string()))?;

        debug!(url = %url, "WebSocket connected");
        Ok(stream)
    }

    /// Event loop that owns the socket across reconnects.
    async fn run_event_loop(
        url: Url,
        headers: HeaderMap,
        initial: WsStream,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
        connected: Arc<AtomicBool>,
        handler: HandlerSlot,
    ) {
        let mut stream = Some(initial);
        let mut backoff = INITIAL_RECONNECT_DELAY;

        loop {
            let ws = match stream.take() {
                Some(ws) => ws,
                None => match Self::dial(&url, &headers).await {
                    Ok(ws) => ws,
                    Err(e) => {
                        warn!(error = %e, delay = ?backoff, "Redial failed, backing off");
                        if let Some(h) = Self::current_handler(&handler) {
                            h.on_error(e);
                        }
                        if Self::wait_backoff(backoff, &mut command_rx).await {
                            break;
                        }
                        backoff = (backoff * 2).min(MAX_RECONNECT_DELAY);
                        continue;
                    }
                },
            };

            backoff = INITIAL_RECONNECT_DELAY;
            connected.store(true, Ordering::SeqCst);
            if let Some(h) = Self::current_handler(&handler) {
                h.on_connect();
            }

            let end = Self::run_session(ws, &mut command_rx, &handler).await;
            connected.store(false, Ordering::SeqCst);

            match end {
                SessionEnd::Redial => continue,
                SessionEnd::Shutdown => break,
            }
        }

        connected.store(false, Ordering::SeqCst);
        debug!("Transport event loop terminated");
    }

    /// Runs one connected session until the socket drops or a command
    /// ends it.
    async fn run_session(
        ws: WsStream,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
        handler: &HandlerSlot,
    ) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws.split();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            Self::dispatch(handler, text.as_bytes());
                        }

                        Some(Ok(Message::Binary(data))) => {
                            Self::dispatch(handler, &data);
                        }

                        Some(Ok(Message::Close(_))) | None => {
                            debug!("WebSocket closed by remote");
                            return SessionEnd::Redial;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket read error");
                            if let Some(h) = Self::current_handler(handler) {
                                h.on_error(Error::WebSocket(e));
                            }
                            return SessionEnd::Redial;
                        }

                        // Ignore Ping, Pong, Frame
                        _ => {}
                    }
                }

                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send { text, result_tx }) => {
                            let result = ws_write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(Error::WebSocket);
                            let _ = result_tx.send(result);
                            trace!("Frame sent");
                        }

                        Some(TransportCommand::Reconnect) => {
                            debug!("Reconnect requested");
                            let _ = ws_write.close().await;
                            return SessionEnd::Redial;
                        }

                        Some(TransportCommand::Disconnect) => {
                            debug!("Disconnect requested");
                            let _ = ws_write.close().await;
                            return SessionEnd::Shutdown;
                        }

                        None => {
                            debug!("Command channel closed");
                            return SessionEnd::Shutdown;
                        }
                    }
                }
            }
        }
    }

    /// Sleeps for the backoff period while still honoring commands.
    ///
    /// Returns `true` if the loop should shut down.
    async fn wait_backoff(
        backoff: Duration,
        command_rx: &mut mpsc::UnboundedReceiver<TransportCommand>,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(backoff) => false,
            command = command_rx.recv() => match command {
                Some(TransportCommand::Send { result_tx, .. }) => {
                    let _ = result_tx.send(Err(Error::ConnectionClosed));
                    false
                }
                Some(TransportCommand::Reconnect) => false,
                Some(TransportCommand::Disconnect) | None => true,
            },
        }
    }

    /// Forwards a frame to the handler; dispatch errors go back to the
    /// handler's own error hook.
    fn dispatch(handler: &HandlerSlot, data: &[u8]) {
        if let Some(h) = Self::current_handler(handler)
            && let Err(e) = h.on_message(data)
        {
            warn!(error = %e, "Inbound frame rejected");
            h.on_error(e);
        }
    }

    fn current_handler(handler: &HandlerSlot) -> Option<Arc<dyn TransportHandler>> {
        handler.read().clone()
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<()> {
        if self.command_tx.lock().is_some() {
            return Ok(());
        }

        let stream = Self::dial(&self.url, &self.headers).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        *self.command_tx.lock() = Some(command_tx);

        tokio::spawn(Self::run_event_loop(
            self.url.clone(),
            self.headers.clone(),
            stream,
            command_rx,
            Arc::clone(&self.connected),
            Arc::clone(&self.handler),
        ));

        Ok(())
    }

    async fn reconnect(&self) -> Result<()> {
        let tx = self.command_tx.lock().clone();
        tx.ok_or(Error::ConnectionClosed)?
            .send(TransportCommand::Reconnect)
            .map_err(|_| Error::ConnectionClosed)
    }

    async fn force_disconnect(&self) {
        // Taking the sender first makes later sends fail fast.
        let tx = self.command_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(TransportCommand::Disconnect);
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_json(&self, message: Value) -> Result<()> {
        let text = serde_json::to_string(&message)?;

        let tx = self.command_tx.lock().clone();
        let tx = tx.ok_or(Error::ConnectionClosed)?;

        let (result_tx, result_rx) = oneshot::channel();
        tx.send(TransportCommand::Send { text, result_tx })
            .map_err(|_| Error::ConnectionClosed)?;

        result_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    fn set_handler(&self, handler: Arc<dyn TransportHandler>) {
        *self.handler.write() = Some(handler);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::UnboundedSender;

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    /// Handler that forwards inbound frames into a channel.
    struct ChannelHandler {
        frames: UnboundedSender<String>,
    }

    impl TransportHandler for ChannelHandler {
        fn on_message(&self, data: &[u8]) -> Result<()> {
            let text = String::from_utf8(data.to_vec()).expect("utf8 frame");
            let _ = self.frames.send(text);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_round_trip_with_local_server() {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");

        // Server: accept one connection, expect a PING, answer with PONG.
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.expect("accept");
            let ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
            let (mut write, mut read) = ws.split();

            let frame = read.next().await.expect("frame").expect("read");
            assert!(frame.is_text());

            write
                .send(Message::Text(r#"{"type":"PONG"}"#.into()))
                .await
                .expect("send");

            // Drain until the client closes.
            while let Some(Ok(msg)) = read.next().await {
                if msg.is_close() {
                    break;
                }
            }
        });

        let url = Url::parse(&format!("ws://{addr}")).expect("url");
        let transport = WebSocketTransport::new(url, HeaderMap::new());

        let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
        transport.set_handler(Arc::new(ChannelHandler { frames: frames_tx }));

        transport.connect().await.expect("connect");
        transport
            .send_json(json!({"type": "PING"}))
            .await
            .expect("send");

        let received = frames_rx.recv().await.expect("inbound frame");
        assert_eq!(received, r#"{"type":"PONG"}"#);
        assert!(transport.is_connected());

        transport.force_disconnect().await;
        assert!(!transport.is_connected());
        assert!(transport.send_json(json!({"type": "PING"})).await.is_err());

        server.await.expect("server task");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        init_tracing();

        // Bind then drop to obtain a port with no listener.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}")).expect("url");
        let transport = WebSocketTransport::new(url, HeaderMap::new());

        let result = transport.connect().await;
        assert!(result.is_err());
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let url = Url::parse("ws://127.0.0.1:1").expect("url");
        let transport = WebSocketTransport::new(url, HeaderMap::new());

        let result = transport.send_json(json!({"type": "PING"})).await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_reconnect_before_connect() {
        let url = Url::parse("ws://127.0.0.1:1").expect("url");
        let transport = WebSocketTransport::new(url, HeaderMap::new());

        let result = transport.reconnect().await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
    }
}
