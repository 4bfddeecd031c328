use crate::config::Settings;
use chainflow_agent::RegistryClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Lists the backends a workflow step can target
#[derive(Debug, Clone)]
pub struct BackendCatalog {
    settings: Arc<Settings>,
}

impl BackendCatalog {
    /// Create a catalog over `settings`
    pub fn new(settings: Arc<Settings>) -> Self {
        Self { settings }
    }

    /// Default backend, then external backends, then registry endpoints.
    ///
    /// Registry discovery only runs with a credential configured, and its
    /// failures are logged rather than returned.
    pub async fn list(&self) -> Vec<String> {
        let mut backends = vec![self.settings.default_backend.clone()];
        backends.extend(self.settings.external_backends.iter().cloned());

        if let Some(key) = &self.settings.agent_credential {
            let timeout = Duration::from_secs(self.settings.registry_timeout_seconds);
            let discovered = match RegistryClient::new(&self.settings.registry_url, key, timeout) {
                Ok(registry) => registry.discover_endpoints().await,
                Err(e) => Err(e),
            };
            match discovered {
                Ok(endpoints) => backends.extend(endpoints),
                Err(e) => warn!("Error fetching agents from registry: {}", e),
            }
        }

        info!(count = backends.len(), "Listed backends");
        backends
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::SecretString;
    use serde_json::json;

    #[tokio::test]
    async fn listing_without_credential_skips_registry() {
        let settings = Settings::default()
            .with_default_backend("http://local:8000")
            .with_external_backends(vec!["http://other:8000".to_string()])
            .with_registry_url("http://127.0.0.1:9");
        let backends = BackendCatalog::new(Arc::new(settings)).list().await;
        assert_eq!(backends, vec!["http://local:8000", "http://other:8000"]);
    }

    #[tokio::test]
    async fn listing_appends_registry_endpoints() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/agents")
            .match_header("authorization", "Bearer key")
            .with_status(200)
            .with_body(json!({"agents": [{"endpoint": "https://agents.example/weather"}]}).to_string())
            .create_async()
            .await;

        let settings = Settings::default()
            .with_default_backend("http://local:8000")
            .with_registry_url(server.url())
            .with_agent_credential(SecretString::from("key".to_string()));
        let backends = BackendCatalog::new(Arc::new(settings)).list().await;

        mock.assert_async().await;
        assert_eq!(backends, vec!["http://local:8000", "https://agents.example/weather"]);
    }

    #[tokio::test]
    async fn registry_failure_never_fails_listing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/agents")
            .with_status(500)
            .create_async()
            .await;

        let settings = Settings::default()
            .with_default_backend("http://local:8000")
            .with_registry_url(server.url())
            .with_agent_credential(SecretString::from("key".to_string()));
        let backends = BackendCatalog::new(Arc::new(settings)).list().await;
        assert_eq!(backends, vec!["http://local:8000"]);
    }
}
