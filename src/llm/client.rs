//! LLM HTTP Client
//!
//! This module provides the HTTP client every provider sends its requests
//! through, with per-call deadlines and status/transport error mapping.
//! There is no retry logic; retry policy belongs to the caller.

use crate::error::{CallContext, LlmHubError};
use bytes::Bytes;
use futures::Stream;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Timeout for establishing a connection (in seconds)
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Longest slice of an error body kept in a message
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Failure of a single HTTP exchange, before provider context is attached
#[derive(Error, Debug)]
pub enum HttpError {
    /// Connection, TLS or body read failure
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// Deadline exceeded
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// Header value that cannot be sent
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

impl HttpError {
    /// Attach provider and model, producing a public error
    pub fn with_context(self, context: &CallContext) -> LlmHubError {
        match self {
            Self::TimedOut(after) => context.timeout(after),
            Self::Request(e) => context.generation(e.to_string(), e.status().map(|s| s.as_u16())),
            Self::Status { status, message } => context.generation(message, Some(status)),
            Self::InvalidHeader(message) => context.generation(message, None),
        }
    }
}

/// HTTP client for LLM API requests
#[derive(Clone)]
pub struct LLMHttpClient {
    /// Reqwest HTTP client
    client: Client,
    /// Connect timeout the client was built with
    connect_timeout: Duration,
}

impl LLMHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, HttpError> {
        Self::with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
    }

    /// Create a client with a specific connect timeout
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;

        Ok(Self { client, connect_timeout })
    }

    /// Classify a reqwest failure. Timeouts reqwest enforces itself are connect timeouts.
    fn request_error(&self, err: reqwest::Error) -> HttpError {
        if err.is_timeout() {
            HttpError::TimedOut(self.connect_timeout)
        } else {
            HttpError::Request(err)
        }
    }

    /// POST a JSON body and return the response body as text
    ///
    /// # Arguments
    /// * `url` - Request URL
    /// * `headers` - Request headers
    /// * `body` - Request body (serializable)
    /// * `timeout` - Deadline for the whole exchange
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
        timeout: Duration,
    ) -> Result<String, HttpError> {
        debug!(url, ?timeout, "POST");
        let exchange = async {
            let response = self
                .client
                .post(url)
                .headers(headers)
                .json(body)
                .send()
                .await
                .map_err(|e| self.request_error(e))?;
            let response = check_status(response).await?;
            response.text().await.map_err(|e| self.request_error(e))
        };

        tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| HttpError::TimedOut(timeout))?
    }

    /// POST a JSON body and return the response body as a byte stream
    ///
    /// The connection lives as long as the returned stream; dropping the
    /// stream releases it.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &T,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static, HttpError> {
        debug!(url, ?timeout, "POST (streaming)");
        let exchange = async {
            let response = self
                .client
                .post(url)
                .headers(headers)
                .json(body)
                .send()
                .await
                .map_err(|e| self.request_error(e))?;
            check_status(response).await
        };

        let response = tokio::time::timeout_at(deadline, exchange)
            .await
            .map_err(|_| HttpError::TimedOut(timeout))??;

        Ok(response.bytes_stream())
    }

    /// Build standard headers for API requests
    pub fn build_headers(api_key: Option<&str>) -> Result<HeaderMap, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.is_empty()) {
            let value = HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|_| HttpError::InvalidHeader("API key contains invalid characters".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Add custom header to existing headers
    pub fn add_header(mut headers: HeaderMap, key: &str, value: &str) -> Result<HeaderMap, HttpError> {
        let key_header = HeaderName::from_str(key)
            .map_err(|_| HttpError::InvalidHeader(format!("invalid header name: {}", key)))?;
        let value_header = HeaderValue::from_str(value)
            .map_err(|_| HttpError::InvalidHeader(format!("invalid value for header {}", key)))?;

        headers.insert(key_header, value_header);
        Ok(headers)
    }
}

/// Turn a non-success response into `HttpError::Status`
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read response body".to_string());

    Err(HttpError::Status {
        status: status.as_u16(),
        message: api_error_message(&body),
    })
}

/// Pull `error.message` (or `error` as a string) out of an API error body
pub(crate) fn api_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        let error = v.get("error")?;
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    match message {
        Some(m) => m,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
    }
}
