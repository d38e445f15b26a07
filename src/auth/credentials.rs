use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::auth::storage::SecretStore;

/// Fixed key the refresh token is stored under
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Capacity of the auth event channel
const AUTH_EVENT_CAPACITY: usize = 32;

/// Authentication state transitions, emitted after the state has changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AuthEvent {
    /// Startup load finished
    Restored { authenticated: bool },
    /// Tokens were set by a login/register action
    SignedIn { access_token: Option<String> },
    /// Only the access token changed (refresh exchange)
    AccessTokenUpdated { access_token: String },
    /// Credentials were cleared while authenticated
    SignedOut,
}

/// Point-in-time copy of the credential state
#[derive(Clone, Default, PartialEq)]
pub struct CredentialState {
    /// Short-lived token, memory only
    pub access_token: Option<String>,
    /// Long-lived token, mirrored from durable storage
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    /// True until `load()` has completed once
    pub is_loading: bool,
}

impl fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("CredentialState")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("is_authenticated", &self.is_authenticated)
            .field("is_loading", &self.is_loading)
            .finish()
    }
}

/// Process-wide holder of the access/refresh token pair
///
/// The refresh token lives in durable storage and in memory; the access token
/// is never persisted. Every mutation is visible to all clones as soon as the
/// call returns. Mutations are serialized, so durable storage and memory never
/// disagree once a call has finished.
pub struct CredentialStore {
    /// Durable storage for the refresh token
    secrets: Arc<dyn SecretStore>,
    /// In-memory token state
    state: Arc<RwLock<CredentialState>>,
    /// Held across the durable write and the memory update of each mutation
    mutations: Arc<Mutex<()>>,
    /// Auth event channel
    events: broadcast::Sender<AuthEvent>,
}

impl CredentialStore {
    /// Create a new credential store over the given secret store
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            secrets,
            state: Arc::new(RwLock::new(CredentialState {
                is_loading: true,
                ..CredentialState::default()
            })),
            mutations: Arc::new(Mutex::new(())),
            events,
        }
    }

    /// Restore the refresh token from durable storage
    ///
    /// Never fails: a read error degrades to "unauthenticated".
    pub async fn load(&self) {
        let _mutation = self.mutations.lock().await;
        let stored = match self.secrets.get(REFRESH_TOKEN_KEY).await {
            Ok(token) => token,
            Err(e) => {
                error!(error = %e, "Failed to load refresh token from secure storage");
                None
            }
        };

        let authenticated = {
            let mut state = self.state.write().await;
            state.is_loading = false;
            match stored {
                Some(refresh) => {
                    state.refresh_token = Some(refresh);
                    state.is_authenticated = true;
                }
                None => {
                    state.refresh_token = None;
                    state.is_authenticated = false;
                }
            }
            state.is_authenticated
        };

        info!(authenticated, "Credential store loaded");
        self.emit(AuthEvent::Restored { authenticated });
    }

    /// Persist a new token pair
    ///
    /// The durable write happens first; if it fails, memory is left untouched
    /// and the error is returned.
    pub async fn set_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let _mutation = self.mutations.lock().await;
        self.secrets.set(REFRESH_TOKEN_KEY, refresh_token).await?;

        {
            let mut state = self.state.write().await;
            state.access_token = Some(access_token.to_string());
            state.refresh_token = Some(refresh_token.to_string());
            state.is_authenticated = true;
            state.is_loading = false;
        }

        info!("Tokens stored");
        self.emit(AuthEvent::SignedIn {
            access_token: Some(access_token.to_string()),
        });
        Ok(())
    }

    /// Delete the durable refresh token and clear memory
    ///
    /// Safe to call when already unauthenticated. Memory is cleared even when
    /// the durable delete fails; that failure is still returned.
    pub async fn clear_tokens(&self) -> Result<()> {
        let _mutation = self.mutations.lock().await;
        let deleted = self.secrets.delete(REFRESH_TOKEN_KEY).await;
        if let Err(e) = &deleted {
            error!(error = %e, "Failed to delete refresh token from secure storage");
        }

        let was_authenticated = {
            let mut state = self.state.write().await;
            let was = state.is_authenticated;
            state.access_token = None;
            state.refresh_token = None;
            state.is_authenticated = false;
            state.is_loading = false;
            was
        };

        if was_authenticated {
            info!("Tokens cleared");
            self.emit(AuthEvent::SignedOut);
        } else {
            debug!("Tokens already cleared");
        }
        deleted
    }

    /// Store a rotated token pair handed out by a refresh exchange
    ///
    /// Same durability rule as `set_tokens`, but announced as an access token
    /// update rather than a new sign-in.
    pub async fn rotate_tokens(&self, access_token: &str, refresh_token: &str) -> Result<()> {
        let _mutation = self.mutations.lock().await;
        self.secrets.set(REFRESH_TOKEN_KEY, refresh_token).await?;

        {
            let mut state = self.state.write().await;
            state.access_token = Some(access_token.to_string());
            state.refresh_token = Some(refresh_token.to_string());
        }

        debug!("Token pair rotated");
        self.emit(AuthEvent::AccessTokenUpdated {
            access_token: access_token.to_string(),
        });
        Ok(())
    }

    /// Replace only the in-memory access token
    pub async fn set_access_token(&self, access_token: &str) {
        let _mutation = self.mutations.lock().await;
        self.state.write().await.access_token = Some(access_token.to_string());
        debug!("Access token replaced");
        self.emit(AuthEvent::AccessTokenUpdated {
            access_token: access_token.to_string(),
        });
    }

    /// Apply the outcome of a refresh exchange made with `exchanged`
    ///
    /// Compare-and-set: nothing changes unless the store is still authenticated
    /// with that same refresh token, and `false` is returned. A rotated refresh
    /// token that cannot be persisted is dropped with a warning; the new access
    /// token is still applied.
    pub async fn apply_refresh(
        &self,
        exchanged: &str,
        access_token: &str,
        rotated: Option<&str>,
    ) -> bool {
        let _mutation = self.mutations.lock().await;
        {
            let state = self.state.read().await;
            if !state.is_authenticated || state.refresh_token.as_deref() != Some(exchanged) {
                debug!("Credentials changed during the refresh exchange, discarding its result");
                return false;
            }
        }

        let persisted = match rotated {
            Some(rotated) => match self.secrets.set(REFRESH_TOKEN_KEY, rotated).await {
                Ok(()) => Some(rotated),
                Err(e) => {
                    warn!(error = %e, "Failed to persist rotated refresh token");
                    None
                }
            },
            None => None,
        };

        {
            let mut state = self.state.write().await;
            state.access_token = Some(access_token.to_string());
            if let Some(rotated) = persisted {
                state.refresh_token = Some(rotated.to_string());
            }
        }

        debug!(rotated = persisted.is_some(), "Refresh result applied");
        self.emit(AuthEvent::AccessTokenUpdated {
            access_token: access_token.to_string(),
        });
        true
    }

    /// Current access token, if any
    pub async fn access_token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }

    /// Current refresh token, if any
    pub async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    pub async fn is_loading(&self) -> bool {
        self.state.read().await.is_loading
    }

    /// Copy of the full state
    pub async fn snapshot(&self) -> CredentialState {
        self.state.read().await.clone()
    }

    /// Receive auth events as they happen
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// Auth events as an async stream
    ///
    /// Lagging subscribers skip the events they missed; the stream ends when
    /// every store handle has been dropped.
    pub fn changes(&self) -> impl Stream<Item = AuthEvent> + Send + 'static {
        let mut receiver = self.events.subscribe();
        async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    fn emit(&self, event: AuthEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

// Allow cloning the CredentialStore
// All state is stored behind Arc, so clones observe the same tokens
impl Clone for CredentialStore {
    fn clone(&self) -> Self {
        Self {
            secrets: Arc::clone(&self.secrets),
            state: Arc::clone(&self.state),
            mutations: Arc::clone(&self.mutations),
            events: self.events.clone(),
        }
    }
}
