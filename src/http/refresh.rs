use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use crate::auth::credentials::CredentialStore;
use crate::error::ClientResult;
use crate::http::request::ApiRequest;

/// Route of the refresh exchange, relative to the API base URL
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Body returned by a successful refresh exchange
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access_token: String,
    /// Present when the server rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A call parked while a refresh is in flight
pub(crate) struct PendingRequest {
    pub request: ApiRequest,
    pub reply: oneshot::Sender<ClientResult<Value>>,
}

/// What a request rejected with 401 should do next
pub(crate) enum Admission {
    /// This caller runs the refresh
    Refresh,
    /// A refresh is already running; wait for its outcome
    Wait(oneshot::Receiver<ClientResult<Value>>),
    /// The access token changed since the request was sent; replay with it
    Replay(String),
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    queue: VecDeque<PendingRequest>,
}

/// Single-flight gate for the refresh exchange
///
/// Whether a refresh is running and who is waiting on it are guarded by one
/// lock, so a request can never be queued after the queue was drained.
#[derive(Default)]
pub(crate) struct RefreshCoordinator {
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide how a request that got a 401 proceeds
    ///
    /// `sent_with` is the access token the rejected attempt carried.
    pub async fn admit(
        &self,
        request: &ApiRequest,
        sent_with: Option<&str>,
        credentials: &CredentialStore,
    ) -> Admission {
        let mut state = self.state.lock().await;

        if state.in_progress {
            let (reply, receiver) = oneshot::channel();
            state.queue.push_back(PendingRequest {
                request: request.clone(),
                reply,
            });
            debug!(queued = state.queue.len(), path = %request.path, "Queued behind token refresh");
            return Admission::Wait(receiver);
        }

        // A refresh finished between our send and our 401
        if let Some(current) = credentials.access_token().await {
            if sent_with != Some(current.as_str()) {
                return Admission::Replay(current);
            }
        }

        state.in_progress = true;
        Admission::Refresh
    }

    /// End the refresh and take everything that queued behind it
    pub async fn finish(&self) -> VecDeque<PendingRequest> {
        let mut state = self.state.lock().await;
        state.in_progress = false;
        std::mem::take(&mut state.queue)
    }

    pub async fn is_refreshing(&self) -> bool {
        self.state.lock().await.in_progress
    }

    pub async fn pending_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }
}
