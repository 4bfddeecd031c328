//! Remote agent registry discovery
//!
//! Lists the endpoints a registry advertises under `GET {registry}/agents`.
//! The registry response format is loose; only `agents[].endpoint` strings
//! are read and everything else is ignored.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

/// Default registry base
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.smithery.ai";

/// Errors from registry discovery
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry base URL is unusable
    #[error("Invalid registry URL: {0}")]
    InvalidUrl(String),

    /// The credential cannot be sent as a header
    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    /// Transport failure
    #[error("HTTP error: {0}")]
    Http(String),

    /// Non-success status from the registry
    #[error("Registry returned HTTP {0}: {1}")]
    Status(u16, String),

    /// Body is not JSON
    #[error("JSON error: {0}")]
    Json(String),
}

/// Client for a remote agent registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base_url: Url,
}

impl RegistryClient {
    /// Create a registry client authenticated with `api_key`
    pub fn new(
        base_url: &str,
        api_key: &SecretString,
        timeout: Duration,
    ) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| RegistryError::InvalidUrl(e.to_string()))?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|_| RegistryError::InvalidApiKey("api key contains illegal characters".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        Ok(Self { http, base_url })
    }

    /// Endpoints advertised by the registry, in registry order
    #[instrument(skip(self), fields(registry = %self.base_url))]
    pub async fn discover_endpoints(&self) -> Result<Vec<String>, RegistryError> {
        let mut url_str = self.base_url.to_string();
        if !url_str.ends_with('/') {
            url_str.push('/');
        }
        url_str.push_str("agents");
        let url = Url::parse(&url_str).map_err(|e| RegistryError::InvalidUrl(e.to_string()))?;

        debug!(%url, "Fetching agents from registry");
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RegistryError::Http(e.to_string()))?;

        if !status.is_success() {
            return Err(RegistryError::Status(status.as_u16(), truncate(&body, 400)));
        }

        let json: Value =
            serde_json::from_str(&body).map_err(|e| RegistryError::Json(e.to_string()))?;
        let endpoints = parse_agent_endpoints(&json);
        info!(count = endpoints.len(), "Discovered registry endpoints");
        Ok(endpoints)
    }
}

/// `agents[].endpoint` strings; agents without an endpoint are skipped
pub fn parse_agent_endpoints(json: &Value) -> Vec<String> {
    json.get("agents")
        .and_then(Value::as_array)
        .map(|agents| {
            agents
                .iter()
                .filter_map(|agent| agent.get("endpoint").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parse_agent_endpoints_skips_incomplete_entries() {
        let json = json!({"agents": [
            {"id": "a", "endpoint": "https://registry.smithery.ai/servers/a"},
            {"id": "b"},
            {"id": "c", "endpoint": "https://registry.smithery.ai/servers/c"}
        ]});
        assert_eq!(
            parse_agent_endpoints(&json),
            vec![
                "https://registry.smithery.ai/servers/a",
                "https://registry.smithery.ai/servers/c"
            ]
        );
        assert!(parse_agent_endpoints(&json!({"servers": []})).is_empty());
    }

    #[tokio::test]
    async fn discover_sends_bearer_and_reads_endpoints() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/agents")
            .match_header("authorization", "Bearer reg-key")
            .with_status(200)
            .with_body(json!({"agents": [{"endpoint": "https://agents.example/x"}]}).to_string())
            .create_async()
            .await;

        let key = SecretString::from("reg-key".to_string());
        let client = RegistryClient::new(&server.url(), &key, Duration::from_secs(5))?;
        let endpoints = client.discover_endpoints().await?;

        mock.assert_async().await;
        assert_eq!(endpoints, vec!["https://agents.example/x"]);
        Ok(())
    }

    #[tokio::test]
    async fn discover_reports_status() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agents")
            .with_status(401)
            .with_body("unauthorized")
            .create_async()
            .await;

        let key = SecretString::from("bad".to_string());
        let client = RegistryClient::new(&server.url(), &key, Duration::from_secs(5))?;
        let err = client.discover_endpoints().await.err();
        assert!(matches!(err, Some(RegistryError::Status(401, _))));
        Ok(())
    }
}
