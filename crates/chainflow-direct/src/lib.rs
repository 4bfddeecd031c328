//! Direct chat-completion backend client
//!
//! Talks to any backend exposing the chainflow chat contract:
//! `POST {address}/v1/chat` with `{messages, tools?}`, answered by `{message}`.
//!
//! # Features
//! - Bounded per-call timeout (60s by default)
//! - Optional bearer authentication, decided by the caller per call
//! - Error bodies are redacted and truncated before they are surfaced

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

use chainflow_protocol::Message;
use reqwest::header::{self, HeaderMap, HeaderValue};
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument};
use url::Url;

/// Default timeout for a direct backend call
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

const MAX_ERROR_BODY: usize = 512;

/// Errors raised by the direct backend adapter
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend address could not be turned into a chat URL
    #[error("Invalid backend address {address}: {reason}")]
    InvalidAddress {
        /// Address as configured
        address: String,
        /// Parse failure
        reason: String,
    },

    /// The credential cannot be sent as a header
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Transport failure reaching the backend
    #[error("Failed to reach backend {address}: {message}")]
    Connection {
        /// Backend address
        address: String,
        /// Transport error
        message: String,
    },

    /// The call did not complete within the configured timeout
    #[error("Backend {address} timed out after {timeout_seconds}s")]
    Timeout {
        /// Backend address
        address: String,
        /// Timeout that elapsed
        timeout_seconds: u64,
    },

    /// The backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Redacted, truncated response body
        body: String,
    },

    /// The backend answered 2xx with a body that is not `{message: Message}`
    #[error("Unexpected response from backend {address}: {message}")]
    Decode {
        /// Backend address
        address: String,
        /// Decode failure
        message: String,
    },
}

impl BackendError {
    /// Whether the failure happened before any response was received
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            BackendError::Connection { .. } | BackendError::Timeout { .. }
        )
    }
}

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

/// Chat request body
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Full ordered message list
    pub messages: Vec<Message>,
    /// Opaque tool descriptors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
}

/// Chat response body
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    /// The backend's reply
    pub message: Message,
}

/// A decoded reply plus the payload it was decoded from
#[derive(Debug, Clone)]
pub struct DirectReply {
    /// Normalized reply message
    pub message: Message,
    /// Response body as received
    pub raw: Value,
}

/// Stateless client for direct chat backends
#[derive(Debug, Clone)]
pub struct DirectClient {
    http: reqwest::Client,
    timeout_seconds: u64,
}

impl DirectClient {
    /// Create a new client
    pub fn new(config: ClientConfig) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BackendError::Client(e.to_string()))?;

        Ok(Self {
            http,
            timeout_seconds: config.timeout_seconds,
        })
    }

    /// Configured timeout in seconds
    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    fn build_headers(&self, bearer: Option<&SecretString>) -> Result<HeaderMap, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        if let Some(token) = bearer {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                .map_err(|e| BackendError::InvalidCredential(e.to_string()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }

        Ok(headers)
    }

    /// Send one chat request to `address`.
    ///
    /// `bearer` is attached as `Authorization: Bearer <token>` when given.
    #[instrument(skip(self, request, bearer), fields(messages = request.messages.len()))]
    pub async fn invoke(
        &self,
        address: &str,
        request: &ChatRequest,
        bearer: Option<&SecretString>,
    ) -> Result<DirectReply, BackendError> {
        let url = chat_url(address)?;
        let headers = self.build_headers(bearer)?;

        debug!(%url, authenticated = bearer.is_some(), "Sending chat request");

        let response = self
            .http
            .post(url)
            .headers(headers)
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(address, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(address, e))?;

        if !status.is_success() {
            error!("Backend error ({}): {}", status, truncate(&body, MAX_ERROR_BODY));
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: sanitize_body(&body),
            });
        }

        let raw: Value = serde_json::from_str(&body).map_err(|e| BackendError::Decode {
            address: address.to_string(),
            message: e.to_string(),
        })?;
        let parsed: ChatResponse =
            serde_json::from_value(raw.clone()).map_err(|e| BackendError::Decode {
                address: address.to_string(),
                message: e.to_string(),
            })?;

        info!(
            role = %parsed.message.role,
            parts = parsed.message.content.parts.len(),
            "Chat request completed"
        );

        Ok(DirectReply {
            message: parsed.message,
            raw,
        })
    }

    fn transport_error(&self, address: &str, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout {
                address: address.to_string(),
                timeout_seconds: self.timeout_seconds,
            }
        } else {
            BackendError::Connection {
                address: address.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Build `{address}/v1/chat`, keeping any path prefix on the address
pub fn chat_url(address: &str) -> Result<Url, BackendError> {
    let trimmed = address.trim();
    let invalid = |reason: String| BackendError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let base = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    match base.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(format!("unsupported scheme: {other}"))),
    }

    // Url::join replaces the last segment unless the base ends with '/'
    let mut url_str = base.to_string();
    if !url_str.ends_with('/') {
        url_str.push('/');
    }
    url_str.push_str("v1/chat");
    Url::parse(&url_str).map_err(|e| invalid(e.to_string()))
}

fn redaction_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)bearer\s+[A-Za-z0-9._~+/=-]+", "Bearer ***"),
            (r"(?i)(api[_-]?key=)[^&\s]+", "${1}***"),
            (r"sk-[a-zA-Z0-9]{20,}", "sk-***"),
            (r"[a-zA-Z0-9_-]{40,}", "***REDACTED***"),
        ]
        .into_iter()
        .filter_map(|(pattern, replacement)| {
            Regex::new(pattern).ok().map(|re| (re, replacement))
        })
        .collect()
    })
}

/// Redact credentials from a backend error body and cap its length
pub fn sanitize_body(body: &str) -> String {
    let mut sanitized = body.to_string();
    for (re, replacement) in redaction_patterns() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    truncate(&sanitized, MAX_ERROR_BODY)
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}… [truncated]", &s[..end])
}
