use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::auth::credentials::CredentialStore;
use crate::config::Config;
use crate::error::{
    request_abandoned, session_expired, ApiError, ClientResult, ErrorCode, TransportError,
};
use crate::events::{Notice, NoticeBus};
use crate::http::refresh::{
    Admission, PendingRequest, RefreshCoordinator, RefreshResponse, REFRESH_PATH,
};
use crate::http::request::ApiRequest;
use crate::http::transport::{HttpRequest, HttpResponse, HttpTransport};

const JSON_CONTENT_TYPE: &str = "application/json";

/// Why a single attempt did not produce a usable body
enum Failure {
    /// The server answered with a non-success status
    Status(HttpResponse),
    /// No response was received
    Transport(TransportError),
}

struct ClientInner {
    config: Config,
    transport: Arc<dyn HttpTransport>,
    credentials: CredentialStore,
    notices: NoticeBus,
    coordinator: RefreshCoordinator,
}

/// The authenticated request pipeline
///
/// Every call gets the current bearer token attached. A 401 triggers at most
/// one refresh exchange no matter how many calls fail at once: the first
/// rejected call runs it, the rest queue behind it and are replayed in arrival
/// order once it succeeds. Each call is retried at most once.
///
/// Cloning is cheap; clones share the same credentials and refresh state.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl ApiClient {
    pub fn new(
        config: Config,
        transport: Arc<dyn HttpTransport>,
        credentials: CredentialStore,
        notices: NoticeBus,
    ) -> Self {
        info!(
            api_base_url = %config.api_base_url,
            mock_mode = config.mock_mode,
            "Creating API client"
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                credentials,
                notices,
                coordinator: RefreshCoordinator::new(),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    pub fn notices(&self) -> &NoticeBus {
        &self.inner.notices
    }

    /// Whether a refresh exchange is currently in flight
    pub async fn is_refreshing(&self) -> bool {
        self.inner.coordinator.is_refreshing().await
    }

    /// Number of calls waiting on the current refresh
    pub async fn pending_requests(&self) -> usize {
        self.inner.coordinator.pending_len().await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(ApiRequest::put(path).json(body)?).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ClientResult<T> {
        self.request(ApiRequest::patch(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request(ApiRequest::delete(path)).await
    }

    /// Execute a call and decode its body
    pub async fn request<T: DeserializeOwned>(&self, request: ApiRequest) -> ClientResult<T> {
        let value = self.execute(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Execute a call and return its raw JSON body
    #[instrument(
        name = "api_request",
        skip(self, request),
        fields(
            request_id = %uuid::Uuid::new_v4(),
            method = %request.method,
            path = %request.path
        )
    )]
    pub async fn execute(&self, request: ApiRequest) -> ClientResult<Value> {
        if self.inner.config.mock_mode {
            info!("[MOCK] Returning empty success without a network call");
            return Ok(json!({}));
        }

        let token = if request.options.skip_auth {
            None
        } else {
            self.inner.credentials.access_token().await
        };

        match self.send(&request, token.as_deref()).await {
            Ok(body) => Ok(body),
            Err(Failure::Status(response))
                if response.status() == 401 && !request.options.skip_auth =>
            {
                self.recover(request, token).await
            }
            Err(failure) => Err(self.normalize(failure).await),
        }
    }

    /// Handle a 401 on a first attempt
    ///
    /// After a refresh, the caller that ran it replays alongside the queued
    /// calls rather than after them; only the queue is ordered.
    async fn recover(&self, request: ApiRequest, sent_with: Option<String>) -> ClientResult<Value> {
        let admission = self
            .inner
            .coordinator
            .admit(&request, sent_with.as_deref(), &self.inner.credentials)
            .await;

        match admission {
            Admission::Wait(reply) => {
                debug!("Token refresh in progress, waiting");
                reply.await.unwrap_or_else(|_| Err(request_abandoned()))
            }
            Admission::Replay(token) => {
                debug!("Access token changed since the request was sent, replaying");
                self.replay(&request, &token).await
            }
            Admission::Refresh => {
                // Runs detached so a caller giving up cannot strand the queue
                let client = self.clone();
                let token = tokio::spawn(async move { client.run_refresh().await })
                    .await
                    .map_err(|e| {
                        ApiError::new(ErrorCode::Internal)
                            .message("Token refresh task failed")
                            .context(e.to_string())
                            .build()
                    })??;
                self.replay(&request, &token).await
            }
        }
    }

    /// Exchange the refresh token, then settle everyone who queued behind it
    async fn run_refresh(&self) -> ClientResult<String> {
        info!("Access token rejected, refreshing");
        let credentials = &self.inner.credentials;

        let exchanged = match credentials.refresh_token().await {
            Some(token) => token,
            None => {
                return self
                    .end_session(
                        ApiError::new(ErrorCode::SessionExpired)
                            .message("No refresh token available")
                            .build(),
                    )
                    .await
            }
        };

        let tokens = match self.exchange_refresh_token(&exchanged).await {
            Ok(tokens) => tokens,
            Err(e) => return self.end_session(e).await,
        };

        if !credentials
            .apply_refresh(
                &exchanged,
                &tokens.access_token,
                tokens.refresh_token.as_deref(),
            )
            .await
        {
            // Signed out or signed in again while the exchange was running
            info!("Session changed during token refresh, discarding the new token");
            self.reject_pending().await;
            return Err(session_expired());
        }

        let pending = self.inner.coordinator.finish().await;
        info!(queued = pending.len(), "Token refreshed");
        self.replay_pending(pending, tokens.access_token.clone());
        Ok(tokens.access_token)
    }

    /// A failed exchange logs out and rejects the queue
    async fn end_session(&self, cause: ApiError) -> ClientResult<String> {
        warn!(error = %cause, "Token refresh failed, signing out");
        if let Err(clear_err) = self.inner.credentials.clear_tokens().await {
            error!(error = %clear_err, "Failed to clear credentials after refresh failure");
        }
        self.reject_pending().await;
        self.inner.notices.publish(Notice::session_expired()).await;
        Err(session_expired())
    }

    async fn reject_pending(&self) {
        let pending = self.inner.coordinator.finish().await;
        for waiting in pending {
            let _ = waiting.reply.send(Err(session_expired()));
        }
    }

    /// POST the refresh token, unauthenticated
    async fn exchange_refresh_token(&self, refresh_token: &str) -> ClientResult<RefreshResponse> {
        let request = ApiRequest::post(REFRESH_PATH)
            .with_body(json!({ "refresh_token": refresh_token }))
            .skip_auth();

        let body = match self.send(&request, None).await {
            Ok(body) => body,
            Err(Failure::Status(response)) => {
                return Err(ApiError::from_response(response.status(), response.body()))
            }
            Err(Failure::Transport(e)) => return Err(e.into()),
        };

        let tokens: RefreshResponse = serde_json::from_value(body)?;
        if tokens.access_token.is_empty() {
            return Err(ApiError::new(ErrorCode::Decode)
                .message("Refresh response did not include an access token")
                .build());
        }
        Ok(tokens)
    }

    /// Replay queued calls with the new token, in the order they queued
    ///
    /// `join_all` polls its futures in order and each replay reaches the
    /// transport on its first poll, so requests go out in queue order.
    fn replay_pending(&self, pending: VecDeque<PendingRequest>, token: String) {
        if pending.is_empty() {
            return;
        }

        let client = self.clone();
        tokio::spawn(async move {
            let replays = pending.into_iter().map(|waiting| {
                let client = &client;
                let token = &token;
                async move {
                    let result = client.replay(&waiting.request, token).await;
                    if waiting.reply.send(result).is_err() {
                        debug!(path = %waiting.request.path, "Queued caller went away before replay finished");
                    }
                }
            });
            futures::future::join_all(replays).await;
        });
    }

    /// Second and final attempt; a 401 here is returned as-is
    async fn replay(&self, request: &ApiRequest, token: &str) -> ClientResult<Value> {
        match self.send(request, Some(token)).await {
            Ok(body) => Ok(body),
            Err(failure) => Err(self.normalize(failure).await),
        }
    }

    /// One attempt over the transport
    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<Value, Failure> {
        let http_request = self.build(request, token).map_err(Failure::Transport)?;
        let response = self
            .inner
            .transport
            .execute(http_request)
            .await
            .map_err(Failure::Transport)?;

        if !response.is_success() {
            return Err(Failure::Status(response));
        }

        let body = response.body();
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        // Non-JSON success bodies are handed back as a string
        Ok(serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string())))
    }

    fn build(&self, request: &ApiRequest, token: Option<&str>) -> Result<HttpRequest, TransportError> {
        let mut url = reqwest::Url::parse(&self.inner.config.endpoint(&request.path))
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        let mut headers = HashMap::new();
        headers.insert("Content-Type".to_string(), JSON_CONTENT_TYPE.to_string());
        headers.insert("Accept".to_string(), JSON_CONTENT_TYPE.to_string());
        if let Some(token) = token {
            headers.insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        for (key, value) in &request.options.headers {
            headers.insert(key.clone(), value.clone());
        }

        Ok(HttpRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body: request.body.as_ref().map(|body| body.to_string()),
            timeout: request
                .options
                .timeout
                .unwrap_or_else(|| self.inner.config.request_timeout()),
        })
    }

    /// Fold a failed attempt into the error taxonomy, raising notices on the way
    async fn normalize(&self, failure: Failure) -> ApiError {
        let error = match failure {
            Failure::Status(response) => ApiError::from_response(response.status(), response.body()),
            Failure::Transport(e) => e.into(),
        };

        match error.code {
            ErrorCode::RateLimited => {
                self.inner.notices.publish(Notice::rate_limited()).await;
            }
            ErrorCode::Network => {
                self.inner.notices.publish(Notice::network_unavailable()).await;
            }
            _ => {}
        }

        debug!(error = %error, "Request failed");
        error
    }
}
