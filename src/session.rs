use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::types::{
    CustomerProfile, LoginInput, LoginResponse, ProviderProfile, RegisterInput, User, UserRole,
};
use crate::api::{AuthApi, ProfilesApi};
use crate::auth::credentials::{AuthEvent, CredentialStore};
use crate::error::{storage_failed, ApiError, ClientResult, ErrorCode};
use crate::events::{Notice, NoticeBus};
use crate::http::ApiClient;

/// Who is signed in, as last reported by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SessionProfile {
    pub user: Option<User>,
    pub role: Option<UserRole>,
    pub customer_profile: Option<CustomerProfile>,
    pub provider_profile: Option<ProviderProfile>,
}

/// In-memory store for the signed-in user and their role profile
#[derive(Clone, Default)]
pub struct SessionStore {
    state: Arc<RwLock<SessionProfile>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the user; the role follows the user
    pub async fn set_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.role = Some(user.role);
        state.user = Some(user);
    }

    pub async fn set_customer_profile(&self, profile: CustomerProfile) {
        self.state.write().await.customer_profile = Some(profile);
    }

    pub async fn set_provider_profile(&self, profile: ProviderProfile) {
        self.state.write().await.provider_profile = Some(profile);
    }

    pub async fn clear(&self) {
        *self.state.write().await = SessionProfile::default();
    }

    pub async fn user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    pub async fn role(&self) -> Option<UserRole> {
        self.state.read().await.role
    }

    pub async fn snapshot(&self) -> SessionProfile {
        self.state.read().await.clone()
    }
}

/// Login, registration, logout and restore
///
/// The only code besides the refresh coordinator that writes credentials.
#[derive(Clone)]
pub struct Session {
    auth: AuthApi,
    profiles: ProfilesApi,
    credentials: CredentialStore,
    notices: NoticeBus,
    store: SessionStore,
}

impl Session {
    pub fn new(client: ApiClient, store: SessionStore) -> Self {
        Self {
            auth: AuthApi::new(client.clone()),
            profiles: ProfilesApi::new(client.clone()),
            credentials: client.credentials().clone(),
            notices: client.notices().clone(),
            store,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Load stored credentials and, when signed in, fetch the profile
    ///
    /// Only a refresh token survives a restart, so the profile fetch is what
    /// obtains the first access token. Returns whether a session is active.
    pub async fn restore(&self) -> bool {
        self.credentials.load().await;
        if !self.credentials.is_authenticated().await {
            info!("No stored session");
            return false;
        }

        match self.profiles.me().await {
            Ok(profile) => {
                if let Some(user) = profile.user {
                    self.store.set_user(user).await;
                }
                if let Some(customer) = profile.customer_profile {
                    self.store.set_customer_profile(customer).await;
                }
                if let Some(provider) = profile.provider_profile {
                    self.store.set_provider_profile(provider).await;
                }
                info!("Session restored");
            }
            Err(e) => warn!(error = %e, "Could not load profile for restored session"),
        }

        self.credentials.is_authenticated().await
    }

    pub async fn login(&self, input: &LoginInput) -> ClientResult<Option<User>> {
        let response = self.auth.login(input).await?;
        let user = self.establish(response).await?;
        self.notices.publish(Notice::success("Welcome back!")).await;
        Ok(user)
    }

    pub async fn register(&self, input: &RegisterInput) -> ClientResult<Option<User>> {
        let response = self.auth.register(input).await?;
        let user = self.establish(response).await?;
        self.notices.publish(Notice::success("Account created")).await;
        Ok(user)
    }

    /// Sign out locally, revoking the refresh token server-side when possible
    ///
    /// Local state is always cleared, whatever the server says.
    pub async fn logout(&self) -> ClientResult<()> {
        if let Some(refresh_token) = self.credentials.refresh_token().await {
            if let Err(e) = self.auth.logout(&refresh_token).await {
                warn!(error = %e, "Server-side logout failed");
            }
        }

        let cleared = self.credentials.clear_tokens().await;
        self.store.clear().await;
        self.notices.publish(Notice::success("Logged out successfully")).await;
        info!("Logged out");
        cleared.map_err(storage_failed)
    }

    /// Clear the session store whenever credentials are dropped
    ///
    /// Covers the refresh-failure path, where nobody calls `logout`.
    pub fn watch_sign_out(&self) -> JoinHandle<()> {
        let changes = self.credentials.changes();
        let store = self.store.clone();
        tokio::spawn(async move {
            futures_util::pin_mut!(changes);
            while let Some(event) = changes.next().await {
                if event == AuthEvent::SignedOut {
                    debug!("Credentials cleared, dropping session profile");
                    store.clear().await;
                }
            }
        })
    }

    async fn establish(&self, response: LoginResponse) -> ClientResult<Option<User>> {
        let tokens = response.tokens().ok_or_else(|| {
            ApiError::new(ErrorCode::Decode)
                .message("Login response did not include tokens")
                .build()
        })?;

        self.credentials
            .set_tokens(&tokens.access_token, &tokens.refresh_token)
            .await
            .map_err(storage_failed)?;

        if let Some(user) = response.user.clone() {
            self.store.set_user(user).await;
        }
        if let Some(customer) = response.customer_profile {
            self.store.set_customer_profile(customer).await;
        }
        if let Some(provider) = response.provider_profile {
            self.store.set_provider_profile(provider).await;
        }
        Ok(response.user)
    }
}
