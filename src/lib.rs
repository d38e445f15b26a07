use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

// Export modules
pub mod api;
pub mod auth;
pub mod common;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod realtime;
pub mod session;

#[cfg(test)]
mod tests;

pub use api::{AuthApi, JobsApi, MessagingApi, ProfilesApi, QuotesApi};
pub use auth::{AuthEvent, CredentialState, CredentialStore, KeyringSecretStore, MemorySecretStore, SecretStore};
pub use config::{Config, RealtimeConfig};
pub use error::{ApiError, ClientResult, ErrorCode, TransportError};
pub use events::{Notice, NoticeBus, NoticeLevel};
pub use http::{ApiClient, ApiRequest, HttpTransport, RequestOptions, ReqwestTransport};
pub use realtime::{ChannelState, RealtimeMessage, RealtimeSupervisor, SessionChannel, WebSocketChannel};
pub use session::{Session, SessionProfile, SessionStore};

/// Main application state
///
/// Builds every component from one `Config` and wires them together. One per
/// process.
pub struct AppState {
    pub config: Config,
    pub credentials: CredentialStore,
    pub notices: NoticeBus,
    pub client: ApiClient,
    pub session: Session,
    pub auth: AuthApi,
    pub jobs: JobsApi,
    pub quotes: QuotesApi,
    pub messaging: MessagingApi,
    pub profiles: ProfilesApi,
    pub realtime: RealtimeSupervisor,
    /// Background listeners owned by the state
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl AppState {
    /// Create application state backed by the OS keychain, reqwest and a websocket channel
    ///
    /// Mock mode keeps secrets in memory so a demo run never touches the keychain.
    pub fn new(config: Config) -> Self {
        let secrets: Arc<dyn SecretStore> = if config.mock_mode {
            Arc::new(MemorySecretStore::new())
        } else {
            Arc::new(KeyringSecretStore::new(&config.secret_service))
        };
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
        let channel: Arc<dyn SessionChannel> = Arc::new(WebSocketChannel::new(&config));
        Self::with_parts(config, secrets, transport, channel)
    }

    /// Create application state from explicit seams
    pub fn with_parts(
        config: Config,
        secrets: Arc<dyn SecretStore>,
        transport: Arc<dyn HttpTransport>,
        channel: Arc<dyn SessionChannel>,
    ) -> Self {
        let credentials = CredentialStore::new(secrets);
        let notices = NoticeBus::default();
        let client = ApiClient::new(config.clone(), transport, credentials.clone(), notices.clone());
        let realtime = RealtimeSupervisor::new(channel, credentials.clone(), config.realtime.enabled);

        Self {
            session: Session::new(client.clone(), SessionStore::new()),
            auth: AuthApi::new(client.clone()),
            jobs: JobsApi::new(client.clone()),
            quotes: QuotesApi::new(client.clone()),
            messaging: MessagingApi::new(client.clone()),
            profiles: ProfilesApi::new(client.clone()),
            config,
            credentials,
            notices,
            client,
            realtime,
            background: Mutex::new(Vec::new()),
        }
    }

    /// Start listeners and restore any stored session
    ///
    /// Returns whether a session is active afterwards.
    pub async fn initialize(&self) -> bool {
        info!("Initializing application");

        // Listeners first so they observe the restore
        self.realtime.start().await;
        self.background
            .lock()
            .await
            .push(self.session.watch_sign_out());

        let authenticated = self.session.restore().await;
        info!(authenticated, "Application initialized");
        authenticated
    }

    /// Close the realtime channel and stop background listeners
    pub async fn shutdown(&self) {
        info!("Shutting down application");
        self.realtime.shutdown().await;
        for handle in self.background.lock().await.drain(..) {
            handle.abort();
        }
        debug!("Background listeners stopped");
    }
}
