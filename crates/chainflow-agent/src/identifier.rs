use crate::error::AgentSessionError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use url::Url;

/// Sub-path appended to identifiers that name only an owner
pub const PLACEHOLDER_AGENT: &str = "agent";

/// An agent identifier in `@owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedAgentId {
    id: String,
    used_placeholder: bool,
}

impl NormalizedAgentId {
    /// The normalized identifier, always starting with `@`
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// The identifier without its leading `@`, used as the URL path
    pub fn path(&self) -> &str {
        self.id.trim_start_matches('@')
    }

    /// Whether `/agent` had to be appended because no sub-path was given
    pub fn used_placeholder(&self) -> bool {
        self.used_placeholder
    }
}

impl std::fmt::Display for NormalizedAgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Normalize an agent identifier.
///
/// A missing leading `@` is added. An identifier without `/` gets the
/// `/agent` placeholder and is flagged through
/// [`NormalizedAgentId::used_placeholder`] so callers can warn about it.
pub fn normalize_agent_id(raw: &str) -> Result<NormalizedAgentId, AgentSessionError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AgentSessionError::Config("Agent ID is required".to_string()));
    }

    let mut id = if raw.starts_with('@') {
        raw.to_string()
    } else {
        format!("@{raw}")
    };

    let used_placeholder = !id.contains('/');
    if used_placeholder {
        id = format!("{id}/{PLACEHOLDER_AGENT}");
    }

    Ok(NormalizedAgentId {
        id,
        used_placeholder,
    })
}

/// Build the WebSocket URL for an agent session.
///
/// `{server}/{path}/ws?config=<base64 JSON params>&api_key=<token>`
pub fn session_url(
    server: &str,
    agent: &NormalizedAgentId,
    params: Option<&Map<String, Value>>,
    token: &SecretString,
) -> Result<Url, AgentSessionError> {
    let base = server.trim().trim_end_matches('/');
    let mut url = Url::parse(&format!("{base}/{}/ws", agent.path()))
        .map_err(|e| AgentSessionError::Config(format!("invalid agent server URL: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => {}
        other => {
            return Err(AgentSessionError::Config(format!(
                "agent server URL must use ws or wss, got {other}"
            )))
        }
    }

    let config = match params {
        Some(map) => serde_json::to_vec(map),
        None => serde_json::to_vec(&Map::new()),
    }
    .map_err(|e| AgentSessionError::Config(format!("unserializable agent params: {e}")))?;

    url.query_pairs_mut()
        .append_pair("config", &BASE64.encode(config))
        .append_pair("api_key", token.expose_secret());

    Ok(url)
}

/// Copy of `url` safe for logs: the `api_key` parameter is masked
pub fn redact_url(url: &Url) -> String {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if k == "api_key" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), value)
        })
        .collect();

    if pairs.is_empty() {
        return redacted.to_string();
    }

    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn adds_at_prefix() -> anyhow::Result<()> {
        let id = normalize_agent_id("turkyden/weather")?;
        assert_eq!(id.as_str(), "@turkyden/weather");
        assert!(!id.used_placeholder());
        Ok(())
    }

    #[test]
    fn appends_placeholder_for_bare_owner() -> anyhow::Result<()> {
        let id = normalize_agent_id("turkyden")?;
        assert_eq!(id.as_str(), "@turkyden/agent");
        assert!(id.used_placeholder());
        Ok(())
    }

    #[test]
    fn leaves_normalized_ids_alone() -> anyhow::Result<()> {
        let id = normalize_agent_id("@a/b")?;
        assert_eq!(id.as_str(), "@a/b");
        assert_eq!(id.path(), "a/b");
        assert!(!id.used_placeholder());
        Ok(())
    }

    #[test]
    fn rejects_empty_id() {
        assert!(matches!(
            normalize_agent_id("  "),
            Err(AgentSessionError::Config(_))
        ));
    }

    #[test]
    fn session_url_carries_params_and_key() -> anyhow::Result<()> {
        let id = normalize_agent_id("turkyden/weather")?;
        let mut params = Map::new();
        params.insert("units".to_string(), json!("metric"));
        let token = SecretString::from("k-123".to_string());

        let url = session_url("wss://server.smithery.ai/", &id, Some(&params), &token)?;
        assert_eq!(url.path(), "/turkyden/weather/ws");

        let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(query[1], ("api_key".to_string(), "k-123".to_string()));
        let decoded = BASE64.decode(&query[0].1)?;
        let config: Value = serde_json::from_slice(&decoded)?;
        assert_eq!(config, json!({"units": "metric"}));
        Ok(())
    }

    #[test]
    fn session_url_rejects_http_server() -> anyhow::Result<()> {
        let id = normalize_agent_id("a/b")?;
        let token = SecretString::from("k".to_string());
        assert!(session_url("https://server.smithery.ai", &id, None, &token).is_err());
        Ok(())
    }

    #[test]
    fn redact_url_masks_api_key() -> anyhow::Result<()> {
        let id = normalize_agent_id("a/b")?;
        let token = SecretString::from("topsecret".to_string());
        let url = session_url("ws://localhost:1234", &id, None, &token)?;
        let redacted = redact_url(&url);
        assert!(!redacted.contains("topsecret"));
        assert!(redacted.contains("api_key=***") || redacted.contains("api_key=%2A%2A%2A"));
        Ok(())
    }
}
