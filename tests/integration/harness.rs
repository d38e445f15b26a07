//! Shared setup for the integration tests

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;

use jobmarket_lib::{
    ApiClient, ChannelState, Config, CredentialStore, HttpTransport, MemorySecretStore,
    NoticeBus, ReqwestTransport, SecretStore,
};

/// An `ApiClient` over reqwest pointed at a mock server
pub struct TestClient {
    pub client: ApiClient,
    pub credentials: CredentialStore,
    pub secrets: MemorySecretStore,
    pub notices: NoticeBus,
}

impl TestClient {
    pub fn new(server_url: &str) -> Self {
        Self::with_config(Config::with_base_url(format!("{}/api", server_url)))
    }

    pub fn with_config(config: Config) -> Self {
        let secrets = MemorySecretStore::new();
        let credentials = CredentialStore::new(Arc::new(secrets.clone()) as Arc<dyn SecretStore>);
        let notices = NoticeBus::default();
        let client = ApiClient::new(
            config,
            Arc::new(ReqwestTransport::new()) as Arc<dyn HttpTransport>,
            credentials.clone(),
            notices.clone(),
        );
        Self {
            client,
            credentials,
            secrets,
            notices,
        }
    }

    /// Sign in with a token pair as if a login had just happened
    pub async fn signed_in(self, access_token: &str, refresh_token: &str) -> Self {
        self.credentials
            .set_tokens(access_token, refresh_token)
            .await
            .expect("storing tokens in memory cannot fail");
        self
    }
}

/// A local websocket server that echoes every frame back as an `echo` event
///
/// Each accepted handshake reports its `Authorization` header on `handshakes`.
pub struct EchoServer {
    pub url: String,
    pub handshakes: mpsc::UnboundedReceiver<Option<String>>,
    /// Dropping every open connection when set
    kick: watch::Sender<u32>,
    task: JoinHandle<()>,
}

impl EchoServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (handshake_tx, handshakes) = mpsc::unbounded_channel();
        let (kick, _) = watch::channel(0u32);
        let kick_for_task = kick.clone();

        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handshake_tx = handshake_tx.clone();
                let mut kicked = kick_for_task.subscribe();
                tokio::spawn(async move {
                    let callback = move |request: &Request, response: Response| {
                        let auth = request
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        let _ = handshake_tx.send(auth);
                        Ok::<Response, ErrorResponse>(response)
                    };
                    let Ok(mut ws) = accept_hdr_async(stream, callback).await else {
                        return;
                    };

                    let welcome = json!({ "event": "welcome", "data": {} }).to_string();
                    if ws.send(Message::text(welcome)).await.is_err() {
                        return;
                    }

                    loop {
                        tokio::select! {
                            _ = kicked.changed() => return,
                            frame = ws.next() => match frame {
                                Some(Ok(Message::Text(text))) => {
                                    let received: serde_json::Value =
                                        serde_json::from_str(text.as_str()).unwrap_or_default();
                                    let reply = json!({ "event": "echo", "data": received });
                                    if ws.send(Message::text(reply.to_string())).await.is_err() {
                                        return;
                                    }
                                }
                                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                                Some(Ok(_)) => {}
                            },
                        }
                    }
                });
            }
        });

        Self {
            url,
            handshakes,
            kick,
            task,
        }
    }

    /// Drop every open connection without a close frame
    pub fn drop_connections(&self) {
        self.kick.send_modify(|n| *n += 1);
    }

    /// Stop accepting and drop every open connection
    pub fn stop(&self) {
        self.task.abort();
        self.drop_connections();
    }

    /// Next handshake's `Authorization` header
    pub async fn next_handshake(&mut self) -> Option<String> {
        tokio::time::timeout(Duration::from_secs(5), self.handshakes.recv())
            .await
            .expect("no handshake in time")
            .expect("server stopped")
    }
}

/// Realtime settings pointing at `url` with fast reconnects
pub fn realtime_config(url: &str, reconnect_attempts: usize) -> Config {
    let mut config = Config::with_base_url("http://127.0.0.1:9/api");
    config.realtime.enabled = true;
    config.realtime.url = Some(url.to_string());
    config.realtime.reconnect_attempts = reconnect_attempts;
    config.realtime.reconnect_delay_ms = 20;
    config.realtime.connect_timeout_secs = 2;
    config
}

/// Wait until the channel reports `expected`
pub async fn wait_for_state(states: &mut watch::Receiver<ChannelState>, expected: ChannelState) {
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("channel never reached {:?}", expected))
        .expect("channel dropped");
}
