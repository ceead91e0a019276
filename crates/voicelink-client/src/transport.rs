//! Transport abstraction for the backend HTTP boundary.
//!
//! Abstracts over the HTTP client so the request pipeline can be exercised
//! deterministically. Production uses [`HttpTransport`] (reqwest); tests
//! use a scripted mock implementing the same [`Transport`] trait.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// HTTP method for an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// GET
    Get,
    /// POST
    Post,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

/// An outbound backend request, fully described.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path (and query) relative to the base URL, e.g. `/auth/login`.
    pub path: String,
    /// JSON body, when present.
    pub body: Option<Value>,
    /// Headers attached by the pipeline (authorization, device id,
    /// timestamp).
    pub headers: Vec<(String, String)>,
}

impl ApiRequest {
    /// Build a request with no pipeline headers attached yet.
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self { method, path: path.into(), body, headers: Vec::new() }
    }

    /// Read a header by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A backend response reduced to what the pipeline needs.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// JSON body, `Value::Null` when the body was absent or not JSON.
    pub body: Value,
    /// Response headers, names lower-cased.
    pub headers: HashMap<String, String>,
}

impl ApiResponse {
    /// Whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The structured failure detail the backend attaches to rejections.
    #[must_use]
    pub fn detail(&self) -> String {
        self.body
            .get("detail")
            .and_then(Value::as_str)
            .unwrap_or("request failed")
            .to_string()
    }

    /// The advertised retry interval for a rate-limited response, from the
    /// `Retry-After` header or the body's `retry_after` field.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        if let Some(header) = self.headers.get("retry-after")
            && let Ok(secs) = header.trim().parse::<u64>()
        {
            return Some(secs);
        }
        self.body.get("retry_after").and_then(Value::as_u64)
    }
}

/// The backend HTTP boundary.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send one request and return the response, whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] only for transport-level failures
    /// (connect, timeout, I/O); HTTP error statuses are returned as
    /// responses.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// Configuration for the production HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL including the API prefix, e.g. `https://api.example.io/v1`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000/api/v1".to_string(), timeout: Duration::from_secs(10) }
    }
}

/// Production transport over reqwest.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    http: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the configured base URL and timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the underlying client cannot be
    /// constructed.
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|error| TransportError(error.to_string()))?;
        Ok(Self { base_url: config.base_url.clone(), http })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url),
            Method::Patch => self.http.patch(&url),
            Method::Delete => self.http.delete(&url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| TransportError(error.to_string()))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let text = response.text().await.map_err(|error| TransportError(error.to_string()))?;
        let body = serde_json::from_str(&text).unwrap_or(Value::Null);

        Ok(ApiResponse { status, body, headers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_prefers_header_over_body() {
        let mut headers = HashMap::new();
        headers.insert("retry-after".to_string(), "30".to_string());
        let response = ApiResponse {
            status: 429,
            body: serde_json::json!({ "retry_after": 15 }),
            headers,
        };
        assert_eq!(response.retry_after_secs(), Some(30));

        let response = ApiResponse {
            status: 429,
            body: serde_json::json!({ "retry_after": 15 }),
            headers: HashMap::new(),
        };
        assert_eq!(response.retry_after_secs(), Some(15));

        let response =
            ApiResponse { status: 429, body: Value::Null, headers: HashMap::new() };
        assert_eq!(response.retry_after_secs(), None);
    }

    #[test]
    fn detail_falls_back_when_unstructured() {
        let response = ApiResponse {
            status: 404,
            body: serde_json::json!({ "detail": "Recipient not found" }),
            headers: HashMap::new(),
        };
        assert_eq!(response.detail(), "Recipient not found");

        let response =
            ApiResponse { status: 500, body: Value::Null, headers: HashMap::new() };
        assert_eq!(response.detail(), "request failed");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut request = ApiRequest::new(Method::Get, "/x", None);
        request.headers.push(("Authorization".to_string(), "Bearer t".to_string()));
        assert_eq!(request.header("authorization"), Some("Bearer t"));
        assert_eq!(request.header("x-device-id"), None);
    }
}
