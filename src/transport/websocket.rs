// src/transport/websocket.rs
//! WebSocket transport
//!
//! One io task owns the socket: it forwards outbound payloads from the send
//! queue and delivers inbound text frames, in arrival order, to the channel
//! handed out by `open`. On an unexpected disconnect the task reconnects with
//! the original URL and auth parameters; the reconnect is invisible to the
//! consumer except as a gap in delivery. Exhausted retries or an explicit
//! `stop` end the session permanently (the inbound channel closes).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::transport::auth::{AuthStrategy, OutboundLink};
use crate::transport::MessageTransport;
use crate::utils::errors::{EngineError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Recovery behavior after an unexpected disconnect
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Attempts before giving up for good
    pub max_attempts: u32,

    /// Pause before each attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

struct Shared {
    url: String,
    auth: Arc<dyn AuthStrategy>,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    running: AtomicBool,
}

/// WebSocket implementation of [`MessageTransport`]
pub struct WebSocketTransport {
    shared: Arc<Shared>,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>, auth: Arc<dyn AuthStrategy>) -> Self {
        Self::with_policy(url, auth, ReconnectPolicy::default())
    }

    pub fn with_policy(
        url: impl Into<String>,
        auth: Arc<dyn AuthStrategy>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                url: url.into(),
                auth,
                policy,
                cancel: CancellationToken::new(),
                outbound: Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for WebSocketTransport {
    async fn open(&self) -> Result<mpsc::Receiver<String>> {
        let shared = Arc::clone(&self.shared);
        if shared.running.load(Ordering::SeqCst) {
            return Err(EngineError::Transport("transport already running".into()));
        }

        let socket = establish(&shared).await?;
        info!(url = %shared.url, "connection opened");

        let (in_tx, in_rx) = mpsc::channel(64);
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        *shared.outbound.lock().expect("outbound lock poisoned") = Some(out_tx);
        shared.running.store(true, Ordering::SeqCst);

        tokio::spawn(io_loop(shared, socket, in_tx, out_rx));
        Ok(in_rx)
    }

    async fn send(&self, payload: &str) -> Result<()> {
        let guard = self.shared.outbound.lock().expect("outbound lock poisoned");
        match guard.as_ref() {
            Some(tx) if tx.send(payload.to_string()).is_ok() => Ok(()),
            _ => {
                debug!("send skipped, transport disconnected");
                Ok(())
            }
        }
    }

    async fn stop(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            info!("transport stopped");
        }
        self.shared.cancel.cancel();
        self.shared
            .outbound
            .lock()
            .expect("outbound lock poisoned")
            .take();
    }
}

struct SocketLink<'a> {
    socket: &'a mut WsStream,
}

#[async_trait]
impl OutboundLink for SocketLink<'_> {
    async fn send_text(&mut self, payload: &str) -> Result<()> {
        self.socket
            .send(WsMessage::Text(payload.to_string()))
            .await
            .map_err(|e| EngineError::Transport(format!("handshake send failed: {e}")))
    }
}

/// Connect and run the authentication round-trip.
async fn establish(shared: &Shared) -> Result<WsStream> {
    let (mut socket, _) = connect_async(shared.url.as_str())
        .await
        .map_err(|e| EngineError::Transport(format!("connect failed: {e}")))?;

    let mut link = SocketLink {
        socket: &mut socket,
    };
    if !shared.auth.authenticate(&mut link).await? {
        let _ = socket.close(None).await;
        return Err(EngineError::AuthRejected);
    }
    Ok(socket)
}

async fn io_loop(
    shared: Arc<Shared>,
    socket: WsStream,
    in_tx: mpsc::Sender<String>,
    mut out_rx: mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut stream) = socket.split();
    'session: loop {
        loop {
            tokio::select! {
                _ = shared.cancel.cancelled() => {
                    let _ = sink.close().await;
                    break 'session;
                }
                outbound = out_rx.recv() => match outbound {
                    Some(text) => {
                        debug!(payload = %text, "--> sending");
                        if let Err(e) = sink.send(WsMessage::Text(text)).await {
                            warn!("send failed: {e}");
                            break;
                        }
                    }
                    // Sender dropped on stop; nothing left to forward
                    None => {
                        let _ = sink.close().await;
                        break 'session;
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        debug!(payload = %text, "<-- received");
                        if in_tx.send(text).await.is_err() {
                            break 'session;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        info!("connection closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("receive error: {e}");
                        break;
                    }
                }
            }
        }

        match reconnect(&shared).await {
            Some(new_socket) => {
                info!("reconnected");
                let (new_sink, new_stream) = new_socket.split();
                sink = new_sink;
                stream = new_stream;
            }
            None => break 'session,
        }
    }

    shared.running.store(false, Ordering::SeqCst);
    shared
        .outbound
        .lock()
        .expect("outbound lock poisoned")
        .take();
    debug!("transport io task exiting");
}

/// Re-establish the session after an unexpected disconnect. `None` means the
/// connection stays down for good.
async fn reconnect(shared: &Shared) -> Option<WsStream> {
    for attempt in 1..=shared.policy.max_attempts {
        tokio::select! {
            _ = shared.cancel.cancelled() => return None,
            _ = tokio::time::sleep(shared.policy.delay) => {}
        }
        info!(attempt, "attempting reconnection");
        match establish(shared).await {
            Ok(socket) => return Some(socket),
            Err(EngineError::AuthRejected) => {
                warn!("authentication rejected on reconnect");
                return None;
            }
            Err(e) => warn!(attempt, "reconnect failed: {e}"),
        }
    }
    warn!("reconnection attempts exhausted");
    None
}
