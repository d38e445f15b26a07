use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{config_invalid, ClientResult};

// Default configuration values
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RECONNECT_ATTEMPTS: usize = 5;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SECRET_SERVICE: &str = "jobmarket";

// Environment variable names
pub const ENV_API_BASE_URL: &str = "JOBMARKET_API_BASE_URL";
pub const ENV_MOCK_MODE: &str = "JOBMARKET_MOCK_MODE";
pub const ENV_ENABLE_REALTIME: &str = "JOBMARKET_ENABLE_REALTIME";
pub const ENV_REALTIME_URL: &str = "JOBMARKET_REALTIME_URL";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "JOBMARKET_REQUEST_TIMEOUT_SECS";
pub const ENV_RECONNECT_ATTEMPTS: &str = "JOBMARKET_REALTIME_RECONNECT_ATTEMPTS";
pub const ENV_RECONNECT_DELAY_MS: &str = "JOBMARKET_REALTIME_RECONNECT_DELAY_MS";
pub const ENV_SECRET_SERVICE: &str = "JOBMARKET_SECRET_SERVICE";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL every API route is appended to
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// When set, no network call is made and every call returns an empty success
    #[serde(default = "default_mock_mode")]
    pub mock_mode: bool,
    /// Per-call timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Keychain service name holding the refresh token
    #[serde(default = "default_secret_service")]
    pub secret_service: String,
    /// Realtime channel settings
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Realtime session channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Whether realtime delivery is enabled at all
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,
    /// Explicit socket URL; derived from the API base URL when absent
    #[serde(default = "default_realtime_url")]
    pub url: Option<String>,
    /// Automatic reconnection attempts after the first connect attempt
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: usize,
    /// Fixed delay between reconnection attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// Handshake timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

// Default functions
fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|val| val.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn default_api_base_url() -> String {
    std::env::var(ENV_API_BASE_URL)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

fn default_mock_mode() -> bool {
    env_flag(ENV_MOCK_MODE)
}

fn default_request_timeout() -> u64 {
    std::env::var(ENV_REQUEST_TIMEOUT_SECS)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS)
}

fn default_secret_service() -> String {
    std::env::var(ENV_SECRET_SERVICE)
        .ok()
        .filter(|val| !val.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SECRET_SERVICE.to_string())
}

fn default_realtime_enabled() -> bool {
    env_flag(ENV_ENABLE_REALTIME)
}

fn default_realtime_url() -> Option<String> {
    std::env::var(ENV_REALTIME_URL)
        .ok()
        .filter(|val| !val.trim().is_empty())
}

fn default_reconnect_attempts() -> usize {
    std::env::var(ENV_RECONNECT_ATTEMPTS)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_RECONNECT_ATTEMPTS)
}

fn default_reconnect_delay() -> u64 {
    std::env::var(ENV_RECONNECT_DELAY_MS)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(DEFAULT_RECONNECT_DELAY_MS)
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            url: default_realtime_url(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            mock_mode: default_mock_mode(),
            request_timeout_secs: default_request_timeout(),
            secret_service: default_secret_service(),
            realtime: RealtimeConfig::default(),
        }
    }
}

impl Config {
    /// Build configuration from the process environment
    pub fn from_env() -> ClientResult<Self> {
        let config = Self::default();
        config.validate()?;
        debug!(
            api_base_url = %config.api_base_url,
            mock_mode = config.mock_mode,
            realtime_enabled = config.realtime.enabled,
            "Loaded configuration from environment"
        );
        Ok(config)
    }

    /// Configuration pointing at an explicit base URL with everything else defaulted
    pub fn with_base_url(api_base_url: impl Into<String>) -> Self {
        Self {
            api_base_url: api_base_url.into(),
            mock_mode: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            secret_service: DEFAULT_SECRET_SERVICE.to_string(),
            realtime: RealtimeConfig {
                enabled: false,
                url: None,
                reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
                reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
                connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            },
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClientResult<()> {
        let url = reqwest::Url::parse(&self.api_base_url).map_err(|e| {
            config_invalid(ENV_API_BASE_URL, &self.api_base_url, &e.to_string())
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(config_invalid(
                ENV_API_BASE_URL,
                &self.api_base_url,
                "scheme must be http or https",
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(config_invalid(
                ENV_REQUEST_TIMEOUT_SECS,
                "0",
                "timeout must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Per-call timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for an API route
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Socket URL for the realtime channel
    ///
    /// Without an explicit override this is the API base URL with a trailing
    /// `/api` removed and the scheme mapped to `ws`/`wss`.
    pub fn realtime_url(&self) -> String {
        if let Some(url) = &self.realtime.url {
            return url.clone();
        }

        let base = self.api_base_url.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        }
    }
}
