use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::auth::credentials::{AuthEvent, CredentialStore};
use crate::realtime::channel::SessionChannel;

struct SupervisorInner {
    channel: Arc<dyn SessionChannel>,
    credentials: CredentialStore,
    enabled: AtomicBool,
    /// A connect has been issued since the last sign-in or sign-out
    session_opened: AtomicBool,
    /// Serializes connect/disconnect decisions
    transitions: Mutex<()>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// Drives the realtime channel from authentication state
///
/// Connects on sign-in, disconnects on sign-out or when realtime delivery is
/// disabled. Silent token refreshes do not reconnect an open session; the one
/// exception is a restored session, whose first access token is only known
/// after its first refresh.
#[derive(Clone)]
pub struct RealtimeSupervisor {
    inner: Arc<SupervisorInner>,
}

impl RealtimeSupervisor {
    pub fn new(channel: Arc<dyn SessionChannel>, credentials: CredentialStore, enabled: bool) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                channel,
                credentials,
                enabled: AtomicBool::new(enabled),
                session_opened: AtomicBool::new(false),
                transitions: Mutex::new(()),
                listener: Mutex::new(None),
            }),
        }
    }

    pub fn channel(&self) -> &Arc<dyn SessionChannel> {
        &self.inner.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    /// Start following auth events, connecting right away if already signed in
    pub async fn start(&self) {
        let mut listener = self.inner.listener.lock().await;
        if listener.is_some() {
            debug!("Realtime supervisor already running");
            return;
        }

        // Subscribe before looking at the current state so no transition is missed
        let changes = self.inner.credentials.changes();
        let supervisor = self.clone();
        *listener = Some(tokio::spawn(async move {
            futures_util::pin_mut!(changes);
            while let Some(event) = changes.next().await {
                supervisor.handle(event).await;
            }
            debug!("Auth event stream ended");
        }));
        drop(listener);

        self.evaluate().await;
        info!(enabled = self.is_enabled(), "Realtime supervisor started");
    }

    /// Turn realtime delivery on or off at runtime
    pub async fn set_enabled(&self, enabled: bool) {
        let previous = self.inner.enabled.swap(enabled, Ordering::SeqCst);
        if previous == enabled {
            return;
        }

        info!(enabled, "Realtime delivery toggled");
        if enabled {
            self.evaluate().await;
        } else {
            self.close("realtime delivery disabled").await;
        }
    }

    /// Stop following auth events and close the channel
    pub async fn shutdown(&self) {
        if let Some(listener) = self.inner.listener.lock().await.take() {
            listener.abort();
            if let Err(e) = listener.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Realtime supervisor listener failed");
                }
            }
        }
        self.close("shutdown").await;
    }

    async fn handle(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn {
                access_token: Some(token),
            } => {
                if self.is_enabled() {
                    self.open(&token).await;
                }
            }
            AuthEvent::AccessTokenUpdated { .. } => self.evaluate().await,
            AuthEvent::SignedOut => self.close("signed out").await,
            AuthEvent::SignedIn { access_token: None } | AuthEvent::Restored { .. } => {}
        }
    }

    /// Connect if enabled, signed in, and no session is open yet
    ///
    /// Decided under the transition lock, so racing callers connect once.
    async fn evaluate(&self) {
        let _guard = self.inner.transitions.lock().await;
        if !self.is_enabled() || self.inner.session_opened.load(Ordering::SeqCst) {
            return;
        }
        let state = self.inner.credentials.snapshot().await;
        if let (true, Some(token)) = (state.is_authenticated, state.access_token) {
            debug!("Opening realtime session for the current access token");
            self.connect_locked(&token).await;
        }
    }

    async fn open(&self, access_token: &str) {
        let _guard = self.inner.transitions.lock().await;
        self.connect_locked(access_token).await;
    }

    /// Caller holds `transitions`
    async fn connect_locked(&self, access_token: &str) {
        self.inner.session_opened.store(true, Ordering::SeqCst);
        if let Err(e) = self.inner.channel.connect(access_token).await {
            error!(error = %e, "Failed to open realtime channel");
        }
    }

    async fn close(&self, reason: &str) {
        let _guard = self.inner.transitions.lock().await;
        self.inner.session_opened.store(false, Ordering::SeqCst);
        debug!(reason, "Closing realtime channel");
        self.inner.channel.disconnect().await;
    }
}
