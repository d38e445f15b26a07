use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{ApiError, ClientResult, ErrorCode};

/// Per-call overrides
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Replaces the configured timeout for this call
    pub timeout: Option<Duration>,
    /// Extra headers, applied after the defaults
    pub headers: HashMap<String, String>,
    /// Send without a bearer token and never attempt a refresh
    pub skip_auth: bool,
}

/// A logical API call, relative to the configured base URL
///
/// The pipeline keeps this around so the exact same call can be replayed
/// after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub options: RequestOptions,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            options: RequestOptions::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a raw JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize a typed payload as the body
    pub fn json<B: Serialize + ?Sized>(self, body: &B) -> ClientResult<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            ApiError::new(ErrorCode::Internal)
                .message("Could not encode request body")
                .context(e.to_string())
                .build()
        })?;
        Ok(self.with_body(value))
    }

    /// Append a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a query parameter only when a value is present
    pub fn query_opt<V: ToString>(self, key: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.headers.insert(key.into(), value.into());
        self
    }

    /// Mark the call as unauthenticated
    pub fn skip_auth(mut self) -> Self {
        self.options.skip_auth = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Draft<'a> {
        title: &'a str,
    }

    #[test]
    fn test_builder_collects_parts() {
        let request = ApiRequest::get("/jobs")
            .query("limit", 20)
            .query_opt("cursor", None::<String>)
            .query_opt("category", Some("plumbing"))
            .timeout(Duration::from_secs(5))
            .skip_auth();

        assert_eq!(request.method, Method::GET);
        assert_eq!(
            request.query,
            vec![
                ("limit".to_string(), "20".to_string()),
                ("category".to_string(), "plumbing".to_string())
            ]
        );
        assert_eq!(request.options.timeout, Some(Duration::from_secs(5)));
        assert!(request.options.skip_auth);
    }

    #[test]
    fn test_json_body() {
        let request = ApiRequest::post("/jobs")
            .json(&Draft { title: "Fix sink" })
            .unwrap();
        assert_eq!(request.body, Some(json!({ "title": "Fix sink" })));
    }
}
