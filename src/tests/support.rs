//! Shared fixtures for the unit tests

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;

use crate::auth::{CredentialStore, MemorySecretStore, SecretStore};
use crate::config::Config;
use crate::events::NoticeBus;
use crate::http::transport::mock::{url_path, MockTransport};
use crate::http::{ApiClient, HttpRequest, HttpResponse};
use crate::error::TransportError;

pub const BASE_URL: &str = "http://api.test/api";

/// A pipeline wired to a scripted transport and an in-memory keychain
pub struct Harness {
    pub client: ApiClient,
    pub transport: MockTransport,
    pub credentials: CredentialStore,
    pub secrets: MemorySecretStore,
    pub notices: NoticeBus,
}

impl Harness {
    pub fn new<F, Fut>(responder: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
    {
        Self::with_config(Config::with_base_url(BASE_URL), responder)
    }

    pub fn with_config<F, Fut>(config: Config, responder: F) -> Self
    where
        F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<HttpResponse, TransportError>> + Send + 'static,
    {
        let transport = MockTransport::new(responder);
        let secrets = MemorySecretStore::new();
        let credentials = CredentialStore::new(Arc::new(secrets.clone()) as Arc<dyn SecretStore>);
        let notices = NoticeBus::default();
        let client = ApiClient::new(
            config,
            Arc::new(transport.clone()),
            credentials.clone(),
            notices.clone(),
        );
        Self {
            client,
            transport,
            credentials,
            secrets,
            notices,
        }
    }

    /// Requests that carried `token` as their bearer, by path
    pub fn paths_sent_with(&self, token: &str) -> Vec<String> {
        self.transport
            .requests()
            .into_iter()
            .filter(|request| request.bearer_token() == Some(token))
            .map(|request| path_of(&request))
            .collect()
    }
}

/// Path of a recorded request relative to the API base URL
pub fn path_of(request: &HttpRequest) -> String {
    url_path(&request.url)
        .trim_start_matches(BASE_URL)
        .to_string()
}

pub fn is_refresh(request: &HttpRequest) -> bool {
    path_of(request) == crate::http::REFRESH_PATH
}

pub fn json_response(status: u16, body: Value) -> Result<HttpResponse, TransportError> {
    Ok(HttpResponse::json(status, &body))
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_for<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    timeout(Duration::from_secs(2), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .expect("condition was not met in time");
}

/// Give spawned tasks a chance to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
