use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::common::retry::{constant_backoff, with_retry_and_backoff};
use crate::config::Config;

/// Capacity of the inbound message channel
const INBOUND_CHANNEL_CAPACITY: usize = 256;
const SHUTDOWN_CHANNEL_SIZE: usize = 1;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection phase of a session channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    /// The socket dropped and automatic reconnection is running
    Reconnecting,
}

/// A realtime frame, sent and received as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeMessage {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl RealtimeMessage {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// A persistent, authenticated, bidirectional connection
///
/// The supervisor decides when to connect and disconnect; implementations own
/// the socket and their own reconnection policy.
#[async_trait]
pub trait SessionChannel: Send + Sync {
    /// Open a session authenticated with `access_token`, replacing any open one
    async fn connect(&self, access_token: &str) -> Result<()>;

    /// Close the session. Safe to call when already closed.
    async fn disconnect(&self);

    /// Send a message; dropped with a warning unless connected
    ///
    /// Returns whether the message was handed to the socket.
    async fn emit(&self, event: &str, data: Value) -> bool;

    /// Receive inbound messages
    fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage>;

    fn state(&self) -> ChannelState;
}

/// Handle to the background task driving one session
struct ActiveSession {
    shutdown: mpsc::Sender<()>,
    outbound: mpsc::UnboundedSender<String>,
    task: JoinHandle<()>,
}

/// Why the pump loop returned
enum PumpExit {
    Shutdown,
    Dropped,
}

/// Websocket implementation of `SessionChannel`
pub struct WebSocketChannel {
    url: String,
    reconnect_attempts: usize,
    reconnect_delay_ms: u64,
    connect_timeout: Duration,
    state: watch::Sender<ChannelState>,
    inbound: broadcast::Sender<RealtimeMessage>,
    session: Mutex<Option<ActiveSession>>,
}

impl WebSocketChannel {
    /// Create a channel using the realtime settings from `config`
    pub fn new(config: &Config) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        let (inbound, _) = broadcast::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            url: config.realtime_url(),
            reconnect_attempts: config.realtime.reconnect_attempts,
            reconnect_delay_ms: config.realtime.reconnect_delay_ms,
            connect_timeout: Duration::from_secs(config.realtime.connect_timeout_secs),
            state,
            inbound,
            session: Mutex::new(None),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Watch connection phase changes
    pub fn state_changes(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Stop the session task and wait for it to finish
    async fn stop_session(session: ActiveSession) {
        // The task may already have exited after exhausting its attempts
        let _ = session.shutdown.send(()).await;
        if let Err(e) = session.task.await {
            error!(error = %e, "Realtime session task failed");
        }
    }
}

#[async_trait]
impl SessionChannel for WebSocketChannel {
    async fn connect(&self, access_token: &str) -> Result<()> {
        // Reject a bad URL up front instead of burning through retries
        self.url
            .as_str()
            .into_client_request()
            .map_err(|e| anyhow!("Invalid realtime URL '{}': {}", self.url, e))?;

        let mut session = self.session.lock().await;
        if let Some(previous) = session.take() {
            debug!("Replacing existing realtime session");
            Self::stop_session(previous).await;
        }

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(SHUTDOWN_CHANNEL_SIZE);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<String>();

        self.state.send_replace(ChannelState::Connecting);
        let task = tokio::spawn(run_session(
            SessionParams {
                url: self.url.clone(),
                access_token: access_token.to_string(),
                max_attempts: self.reconnect_attempts + 1,
                reconnect_delay_ms: self.reconnect_delay_ms,
                connect_timeout: self.connect_timeout,
            },
            self.state.clone(),
            self.inbound.clone(),
            shutdown_rx,
            outbound_rx,
        ));

        *session = Some(ActiveSession {
            shutdown: shutdown_tx,
            outbound: outbound_tx,
            task,
        });
        info!(url = %self.url, "Realtime session starting");
        Ok(())
    }

    async fn disconnect(&self) {
        let session = self.session.lock().await.take();
        match session {
            Some(session) => {
                Self::stop_session(session).await;
                info!("Realtime session closed");
            }
            None => debug!("Realtime channel already closed"),
        }
        self.state.send_replace(ChannelState::Disconnected);
    }

    async fn emit(&self, event: &str, data: Value) -> bool {
        if *self.state.borrow() != ChannelState::Connected {
            warn!(event, "Realtime channel not connected, dropping message");
            return false;
        }

        let frame = match serde_json::to_string(&RealtimeMessage::new(event, data)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(event, error = %e, "Failed to encode realtime message");
                return false;
            }
        };

        match self.session.lock().await.as_ref() {
            Some(session) => {
                if session.outbound.send(frame).is_err() {
                    warn!(event, "Realtime session ended, dropping message");
                    return false;
                }
                true
            }
            None => {
                warn!(event, "Realtime channel not connected, dropping message");
                false
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.inbound.subscribe()
    }

    fn state(&self) -> ChannelState {
        *self.state.borrow()
    }
}

struct SessionParams {
    url: String,
    access_token: String,
    max_attempts: usize,
    reconnect_delay_ms: u64,
    connect_timeout: Duration,
}

/// Connect, pump, and reconnect until shut down or out of attempts
async fn run_session(
    params: SessionParams,
    state: watch::Sender<ChannelState>,
    inbound: broadcast::Sender<RealtimeMessage>,
    mut shutdown_rx: mpsc::Receiver<()>,
    mut outbound_rx: mpsc::UnboundedReceiver<String>,
) {
    let mut phase = ChannelState::Connecting;

    loop {
        state.send_replace(phase);

        let url = params.url.clone();
        let token = params.access_token.clone();
        let connect_timeout = params.connect_timeout;
        let attempt = with_retry_and_backoff(
            move || {
                let url = url.clone();
                let token = token.clone();
                Box::pin(async move { open_socket(&url, &token, connect_timeout).await })
            },
            params.max_attempts,
            "Realtime connect",
            constant_backoff(params.reconnect_delay_ms),
        );

        let ws = tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Shutdown requested while connecting");
                break;
            }
            result = attempt => match result {
                Ok(ws) => ws,
                Err(e) => {
                    warn!(error = %e, "Realtime reconnection attempts exhausted");
                    break;
                }
            },
        };

        state.send_replace(ChannelState::Connected);
        info!("Realtime channel connected");

        match pump(ws, &inbound, &mut shutdown_rx, &mut outbound_rx).await {
            PumpExit::Shutdown => break,
            PumpExit::Dropped => {
                warn!("Realtime connection lost, reconnecting");
                phase = ChannelState::Reconnecting;
            }
        }
    }

    state.send_replace(ChannelState::Disconnected);
    debug!("Realtime session task stopped");
}

/// Websocket handshake carrying the bearer token
async fn open_socket(url: &str, access_token: &str, connect_timeout: Duration) -> Result<WsStream> {
    let mut request = url
        .into_client_request()
        .map_err(|e| anyhow!("Invalid realtime URL '{}': {}", url, e))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", access_token))
        .map_err(|e| anyhow!("Access token is not a valid header value: {}", e))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let (ws, _) = match timeout(connect_timeout, connect_async(request)).await {
        Ok(result) => result.map_err(|e| anyhow!("WebSocket connection failed: {}", e))?,
        Err(_) => return Err(anyhow!("WebSocket connection timed out")),
    };
    Ok(ws)
}

/// Move frames in both directions until the socket drops or shutdown is requested
async fn pump(
    mut ws: WsStream,
    inbound: &broadcast::Sender<RealtimeMessage>,
    shutdown_rx: &mut mpsc::Receiver<()>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) -> PumpExit {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                if let Err(e) = ws.close(None).await {
                    debug!(error = %e, "Error while closing realtime socket");
                }
                return PumpExit::Shutdown;
            }

            Some(frame) = outbound_rx.recv() => {
                if let Err(e) = ws.send(WsMessage::text(frame)).await {
                    warn!(error = %e, "Failed to send realtime message");
                    return PumpExit::Dropped;
                }
            }

            message = ws.next() => match message {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<RealtimeMessage>(text.as_str()) {
                        Ok(message) => {
                            debug!(event = %message.event, "Realtime message received");
                            // No subscribers is fine
                            let _ = inbound.send(message);
                        }
                        Err(e) => warn!(error = %e, "Ignoring malformed realtime frame"),
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!("Received close frame: {:?}", frame);
                    return PumpExit::Dropped;
                }
                Some(Ok(_)) => {
                    // Pings are answered by tungstenite
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    return PumpExit::Dropped;
                }
                None => return PumpExit::Dropped,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_shape() {
        let message: RealtimeMessage =
            serde_json::from_str(r#"{"event":"message:new","data":{"id":"m1"}}"#).unwrap();
        assert_eq!(message.event, "message:new");
        assert_eq!(message.data, json!({ "id": "m1" }));

        // data is optional
        let message: RealtimeMessage = serde_json::from_str(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(message.data, Value::Null);
    }

    #[tokio::test]
    async fn test_emit_while_disconnected_is_dropped() {
        let channel = WebSocketChannel::new(&Config::with_base_url("http://localhost:3000/api"));
        assert_eq!(channel.state(), ChannelState::Disconnected);
        assert_eq!(channel.url(), "ws://localhost:3000");
        assert!(!channel.emit("typing", json!({ "conversation_id": "c1" })).await);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let channel = WebSocketChannel::new(&Config::with_base_url("http://localhost:3000/api"));
        channel.disconnect().await;
        channel.disconnect().await;
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let mut config = Config::with_base_url("http://localhost:3000/api");
        config.realtime.url = Some("not a url".to_string());
        let channel = WebSocketChannel::new(&config);

        assert!(channel.connect("a1").await.is_err());
        assert_eq!(channel.state(), ChannelState::Disconnected);
    }
}
