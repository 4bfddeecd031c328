//! Process-wide settings, built once and shared by `Arc`.

use chainflow_agent::client::DEFAULT_SERVER_URL;
use chainflow_agent::registry::DEFAULT_REGISTRY_URL;
use chainflow_agent::AgentClientConfig;
use chainflow_direct::{ClientConfig, DEFAULT_TIMEOUT_SECONDS};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// Default direct backend address
pub const DEFAULT_BACKEND_URL: &str = "http://mcp_server:8000";

/// Default timeout for registry and capability listing calls
pub const DEFAULT_REGISTRY_TIMEOUT_SECONDS: u64 = 10;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct Settings {
    /// Direct backend used when a step names no target
    pub default_backend: String,
    /// Additional direct backends advertised by the catalog
    pub external_backends: Vec<String>,
    /// Remote agent credential; remote agents are disabled without one
    pub agent_credential: Option<SecretString>,
    /// Remote agent registry base
    pub registry_url: String,
    /// Remote agent WebSocket server base
    pub agent_server_url: String,
    /// Direct targets under one of these origins and paths receive the bearer header
    pub trusted_prefixes: Vec<String>,
    /// Fall back to a plain message when a capability call fails
    pub agent_tool_fallback: bool,
    /// Direct adapter timeout
    pub direct_timeout_seconds: u64,
    /// Registry and capability listing timeout
    pub registry_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_backend: DEFAULT_BACKEND_URL.to_string(),
            external_backends: Vec::new(),
            agent_credential: None,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            agent_server_url: DEFAULT_SERVER_URL.to_string(),
            trusted_prefixes: vec![DEFAULT_REGISTRY_URL.to_string()],
            agent_tool_fallback: false,
            direct_timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            registry_timeout_seconds: DEFAULT_REGISTRY_TIMEOUT_SECONDS,
        }
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; unset or unparsable values keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let registry_url = read("SMITHERY_REGISTRY_URL").unwrap_or(defaults.registry_url);
        let trusted_prefixes = read("TRUSTED_BACKEND_PREFIXES")
            .map(|v| split_list(&v))
            .unwrap_or_else(|| vec![registry_url.clone()]);

        Self {
            default_backend: read("MCP_SERVER_URL").unwrap_or(defaults.default_backend),
            external_backends: read("EXTERNAL_MCP_SERVERS")
                .map(|v| split_list(&v))
                .unwrap_or_default(),
            agent_credential: read("SMITHERY_API_KEY").map(SecretString::from),
            registry_url,
            agent_server_url: read("SMITHERY_SERVER_URL").unwrap_or(defaults.agent_server_url),
            trusted_prefixes,
            agent_tool_fallback: read("AGENT_TOOL_FALLBACK")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.agent_tool_fallback),
            direct_timeout_seconds: read("DIRECT_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.direct_timeout_seconds),
            registry_timeout_seconds: read("REGISTRY_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.registry_timeout_seconds),
        }
    }

    /// Set the default direct backend
    pub fn with_default_backend(mut self, address: impl Into<String>) -> Self {
        self.default_backend = address.into();
        self
    }

    /// Set the extra direct backends
    pub fn with_external_backends(mut self, addresses: Vec<String>) -> Self {
        self.external_backends = addresses;
        self
    }

    /// Set the remote agent credential
    pub fn with_agent_credential(mut self, credential: SecretString) -> Self {
        self.agent_credential = Some(credential);
        self
    }

    /// Set the registry base
    pub fn with_registry_url(mut self, url: impl Into<String>) -> Self {
        self.registry_url = url.into();
        self
    }

    /// Set the agent WebSocket server base
    pub fn with_agent_server_url(mut self, url: impl Into<String>) -> Self {
        self.agent_server_url = url.into();
        self
    }

    /// Replace the trusted prefixes
    pub fn with_trusted_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.trusted_prefixes = prefixes;
        self
    }

    /// Enable or disable capability-call fallback
    pub fn with_agent_tool_fallback(mut self, enabled: bool) -> Self {
        self.agent_tool_fallback = enabled;
        self
    }

    /// Whether remote agent steps may run
    pub fn remote_agents_enabled(&self) -> bool {
        self.agent_credential.is_some()
    }

    /// Whether `address` receives the bearer credential.
    ///
    /// Scheme, host and port must equal a trusted prefix's, the address may
    /// not carry userinfo, and its path must sit under the prefix's path on a
    /// segment boundary.
    pub fn is_trusted(&self, address: &str) -> bool {
        let Ok(target) = Url::parse(address.trim()) else {
            return false;
        };
        if !target.username().is_empty() || target.password().is_some() {
            return false;
        }

        self.trusted_prefixes
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .filter_map(|p| Url::parse(p).ok())
            .any(|prefix| {
                prefix.scheme() == target.scheme()
                    && prefix.host_str().is_some()
                    && prefix.host_str() == target.host_str()
                    && prefix.port_or_known_default() == target.port_or_known_default()
                    && path_within(prefix.path(), target.path())
            })
    }

    /// Direct adapter configuration
    pub fn direct_config(&self) -> ClientConfig {
        ClientConfig {
            timeout_seconds: self.direct_timeout_seconds,
        }
    }

    /// Agent client configuration
    pub fn agent_config(&self) -> AgentClientConfig {
        AgentClientConfig {
            server_url: self.agent_server_url.clone(),
            credential: self.agent_credential.clone(),
            listing_timeout: Duration::from_secs(self.registry_timeout_seconds),
            call_timeout: Duration::from_secs(self.direct_timeout_seconds),
            tool_fallback: self.agent_tool_fallback,
        }
    }
}

fn path_within(prefix: &str, path: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn settings_from(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let settings = settings_from(&[]);
        assert_eq!(settings.default_backend, "http://mcp_server:8000");
        assert!(settings.external_backends.is_empty());
        assert!(!settings.remote_agents_enabled());
        assert_eq!(settings.trusted_prefixes, vec!["https://registry.smithery.ai"]);
        assert_eq!(settings.direct_timeout_seconds, 60);
        assert_eq!(settings.registry_timeout_seconds, 10);
        assert!(!settings.agent_tool_fallback);
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = settings_from(&[
            ("MCP_SERVER_URL", "http://localhost:9000"),
            ("EXTERNAL_MCP_SERVERS", "http://a:1, ,http://b:2,"),
            ("SMITHERY_API_KEY", "secret"),
            ("SMITHERY_REGISTRY_URL", "https://registry.example"),
            ("AGENT_TOOL_FALLBACK", "TRUE"),
            ("DIRECT_TIMEOUT_SECONDS", "5"),
            ("REGISTRY_TIMEOUT_SECONDS", "not-a-number"),
        ]);
        assert_eq!(settings.default_backend, "http://localhost:9000");
        assert_eq!(settings.external_backends, vec!["http://a:1", "http://b:2"]);
        assert!(settings.remote_agents_enabled());
        assert_eq!(settings.trusted_prefixes, vec!["https://registry.example"]);
        assert!(settings.agent_tool_fallback);
        assert_eq!(settings.direct_timeout_seconds, 5);
        assert_eq!(settings.registry_timeout_seconds, 10);
    }

    #[test]
    fn blank_credential_leaves_agents_disabled() {
        let settings = settings_from(&[("SMITHERY_API_KEY", "   ")]);
        assert!(!settings.remote_agents_enabled());
    }

    #[test]
    fn trust_requires_matching_origin() {
        let settings = Settings::default()
            .with_trusted_prefixes(vec!["https://registry.smithery.ai".to_string()]);
        assert!(settings.is_trusted("https://registry.smithery.ai/servers/x"));
        assert!(settings.is_trusted("https://REGISTRY.smithery.ai:443/servers/x"));
        assert!(!settings.is_trusted("http://evil.example/?u=https://registry.smithery.ai"));
        assert!(!settings.is_trusted("http://mcp_server:8000"));
        assert!(!settings.is_trusted("http://registry.smithery.ai/servers/x"));
        assert!(!settings.is_trusted("https://registry.smithery.ai:8443/servers/x"));
        assert!(!settings.is_trusted("not a url"));

        let untrusting = Settings::default().with_trusted_prefixes(vec![" ".to_string()]);
        assert!(!untrusting.is_trusted("http://mcp_server:8000"));
    }

    #[test]
    fn lookalike_hosts_are_not_trusted() {
        let settings = Settings::default();
        assert!(!settings.is_trusted("https://registry.smithery.ai.evil.example/v1"));
        assert!(!settings.is_trusted("https://registry.smithery.ai@evil.example/"));
        assert!(!settings.is_trusted("https://user:pw@registry.smithery.ai/servers/x"));
    }

    #[test]
    fn trusted_path_matches_whole_segments() {
        let settings = Settings::default()
            .with_trusted_prefixes(vec!["https://registry.example/servers/".to_string()]);
        assert!(settings.is_trusted("https://registry.example/servers"));
        assert!(settings.is_trusted("https://registry.example/servers/x"));
        assert!(!settings.is_trusted("https://registry.example/serversevil/x"));
        assert!(!settings.is_trusted("https://registry.example/other"));
    }
}
