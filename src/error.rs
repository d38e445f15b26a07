use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Fallback message when the server does not provide one
pub const DEFAULT_ERROR_MESSAGE: &str = "An error occurred";

/// Normalized failure returned by every pipeline call.
///
/// Callers never see transport-specific shapes: whatever went wrong is folded
/// into a code, a message, and (when the server sent them) the HTTP status and
/// field-level `errors` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// HTTP status, absent when no response was received
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Field-level validation errors as sent by the server
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Value>,
    /// Optional context for additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ApiError {
    /// Create a new error builder with the specified error code
    pub fn new(code: ErrorCode) -> ApiErrorBuilder {
        ApiErrorBuilder {
            code,
            message: String::new(),
            status: None,
            errors: None,
            context: None,
        }
    }

    /// Build a normalized error from a non-success HTTP response
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();

        let message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|v| v.as_str())
            .filter(|m| !m.is_empty())
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
            .to_string();

        let errors = parsed
            .as_ref()
            .and_then(|v| v.get("errors"))
            .filter(|v| !v.is_null())
            .cloned();

        let mut builder = ApiError::new(ErrorCode::from_status(status))
            .message(message)
            .status(status);
        if let Some(errors) = errors {
            builder = builder.errors(errors);
        }
        builder.build()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.code == ErrorCode::Unauthorized
    }

    pub fn is_session_expired(&self) -> bool {
        self.code == ErrorCode::SessionExpired
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code == ErrorCode::RateLimited
    }

    pub fn is_network(&self) -> bool {
        self.code == ErrorCode::Network
    }
}

/// Builder for creating ApiError instances
pub struct ApiErrorBuilder {
    code: ErrorCode,
    message: String,
    status: Option<u16>,
    errors: Option<Value>,
    context: Option<String>,
}

impl ApiErrorBuilder {
    /// Set the error message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Set the HTTP status
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach server-provided field errors
    pub fn errors(mut self, errors: Value) -> Self {
        self.errors = Some(errors);
        self
    }

    /// Set the error context
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the final ApiError
    pub fn build(self) -> ApiError {
        ApiError {
            code: self.code,
            message: self.message,
            status: self.status,
            errors: self.errors,
            context: self.context,
        }
    }
}

/// Error codes for the failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Access token missing, invalid or expired (HTTP 401)
    Unauthorized,
    /// Refresh token unusable; credentials have been cleared
    SessionExpired,
    /// HTTP 429
    RateLimited,
    /// No response received (connect failure, timeout)
    Network,
    /// Any other 4xx
    Validation,
    /// 5xx
    Server,
    /// Response body did not match the expected shape
    Decode,
    /// Secure storage read/write failed
    Storage,
    /// Invalid configuration
    Config,
    Internal,
}

impl ErrorCode {
    /// Classify an HTTP status that is not a success
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorCode::Unauthorized,
            429 => ErrorCode::RateLimited,
            400..=499 => ErrorCode::Validation,
            500..=599 => ErrorCode::Server,
            _ => ErrorCode::Internal,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.status, &self.context) {
            (Some(status), Some(context)) => {
                write!(f, "{} [{}]: {} ({})", self.code, status, self.message, context)
            }
            (Some(status), None) => write!(f, "{} [{}]: {}", self.code, status, self.message),
            (None, Some(context)) => write!(f, "{}: {} ({})", self.code, self.message, context),
            (None, None) => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Unauthorized => write!(f, "UNAUTHORIZED"),
            ErrorCode::SessionExpired => write!(f, "SESSION_EXPIRED"),
            ErrorCode::RateLimited => write!(f, "RATE_LIMITED"),
            ErrorCode::Network => write!(f, "NETWORK"),
            ErrorCode::Validation => write!(f, "VALIDATION"),
            ErrorCode::Server => write!(f, "SERVER"),
            ErrorCode::Decode => write!(f, "DECODE"),
            ErrorCode::Storage => write!(f, "STORAGE"),
            ErrorCode::Config => write!(f, "CONFIG"),
            ErrorCode::Internal => write!(f, "INTERNAL"),
        }
    }
}

impl std::error::Error for ApiError {}

/// Failures raised below the pipeline, before any response exists
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration back
            TransportError::Timeout(Duration::ZERO)
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else if err.is_builder() {
            TransportError::InvalidRequest(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

impl From<TransportError> for ApiError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::InvalidRequest(reason) => ApiError::new(ErrorCode::Internal)
                .message("Could not build request")
                .context(reason)
                .build(),
            other => network_failure(other),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::new(ErrorCode::Decode)
            .message("Unexpected response from server")
            .context(err.to_string())
            .build()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::new(ErrorCode::Internal)
            .message(err.to_string())
            .build()
    }
}

// Custom Result type for pipeline operations
pub type ClientResult<T> = Result<T, ApiError>;

// Utility functions to create errors

/// The refresh token is gone or was rejected
pub fn session_expired() -> ApiError {
    ApiError::new(ErrorCode::SessionExpired)
        .message("Session expired. Please log in again.")
        .status(401)
        .build()
}

/// Create a network failure error
pub fn network_failure(err: impl fmt::Display) -> ApiError {
    ApiError::new(ErrorCode::Network)
        .message("Network error")
        .context(err.to_string())
        .build()
}

/// Create a secure storage error
pub fn storage_failed(err: impl fmt::Display) -> ApiError {
    ApiError::new(ErrorCode::Storage)
        .message("Failed to access secure storage")
        .context(err.to_string())
        .build()
}

/// Create a configuration invalid error
pub fn config_invalid(key: &str, value: &str, reason: &str) -> ApiError {
    ApiError::new(ErrorCode::Config)
        .message(format!("Invalid configuration for '{}'", key))
        .context(format!("value '{}': {}", value, reason))
        .build()
}

/// A queued request whose coordinator went away before answering
pub fn request_abandoned() -> ApiError {
    ApiError::new(ErrorCode::Internal)
        .message("Request was abandoned while waiting for token refresh")
        .build()
}
