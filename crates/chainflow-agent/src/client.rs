use crate::error::AgentSessionError;
use crate::identifier::{normalize_agent_id, redact_url, session_url};
use crate::session::{AgentSession, ToolOutput};
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Default WebSocket server for remote agents
pub const DEFAULT_SERVER_URL: &str = "wss://server.smithery.ai";

/// Configuration for [`AgentClient`]
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    /// WebSocket server base (`ws://` or `wss://`)
    pub server_url: String,
    /// Bearer credential, sent as the `api_key` URL parameter
    pub credential: Option<SecretString>,
    /// Bound for the handshake and capability listing
    pub listing_timeout: Duration,
    /// Bound for tool calls and messages
    pub call_timeout: Duration,
    /// Retry a failed tool call as a plain message instead of failing
    pub tool_fallback: bool,
}

impl Default for AgentClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            credential: None,
            listing_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(60),
            tool_fallback: false,
        }
    }
}

/// What to do once the session is open
#[derive(Debug, Clone, PartialEq)]
pub enum AgentInvocation {
    /// Send `prompt` as a user message
    Message {
        /// Prompt text
        prompt: String,
    },
    /// Call a named capability
    Tool {
        /// Capability name
        name: String,
        /// Capability arguments
        arguments: Map<String, Value>,
        /// Prompt used if the call fails and fallback is enabled
        prompt: String,
    },
}

/// Result of one agent invocation
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOutcome {
    /// Normalized agent id
    pub agent_id: String,
    /// Capability names reported by the agent
    pub available_tools: Vec<String>,
    /// Reply text
    pub response: String,
    /// Reply as received
    pub raw_response: Value,
}

impl AgentOutcome {
    /// Summary payload reported alongside a step result
    pub fn to_payload(&self) -> Value {
        json!({
            "status": "success",
            "agent_id": self.agent_id,
            "available_tools": self.available_tools,
            "response": self.response,
            "raw_response": self.raw_response,
        })
    }
}

/// Opens one session per invocation and always closes it
#[derive(Debug, Clone)]
pub struct AgentClient {
    config: AgentClientConfig,
}

impl AgentClient {
    /// Create a client
    pub fn new(config: AgentClientConfig) -> Self {
        Self { config }
    }

    /// Whether a credential is configured
    pub fn is_enabled(&self) -> bool {
        self.config.credential.is_some()
    }

    /// Client configuration
    pub fn config(&self) -> &AgentClientConfig {
        &self.config
    }

    /// Connect to `agent_id`, list its capabilities, run `invocation`, disconnect.
    ///
    /// `credential` overrides the configured credential for this call only.
    #[instrument(skip(self, params, invocation, credential))]
    pub async fn invoke(
        &self,
        agent_id: &str,
        params: Option<&Map<String, Value>>,
        invocation: AgentInvocation,
        credential: Option<&SecretString>,
    ) -> Result<AgentOutcome, AgentSessionError> {
        let token = credential
            .or(self.config.credential.as_ref())
            .ok_or_else(|| {
                AgentSessionError::Config("remote agent credential is not configured".to_string())
            })?;

        let agent = normalize_agent_id(agent_id)?;
        if agent.used_placeholder() {
            warn!(
                "Agent ID {} doesn't contain a slash. Using placeholder agent name: {}",
                agent_id, agent
            );
        }

        if let AgentInvocation::Message { prompt } = &invocation {
            if prompt.trim().is_empty() {
                return Err(AgentSessionError::Config("Prompt is required".to_string()));
            }
        }

        let url = session_url(&self.config.server_url, &agent, params, token)?;
        info!(agent_id = %agent, url = %redact_url(&url), "Connecting to remote agent");

        let mut session = AgentSession::new(
            agent.as_str(),
            self.config.listing_timeout,
            self.config.call_timeout,
        );
        let result = self.drive(&mut session, &url, invocation).await;
        session.close().await;

        let output = result?;
        Ok(AgentOutcome {
            agent_id: agent.to_string(),
            available_tools: session.tools().to_vec(),
            response: output.text,
            raw_response: output.raw,
        })
    }

    /// Connect, list capabilities and send `prompt`, reporting what the agent offers
    pub async fn probe(
        &self,
        agent_id: &str,
        prompt: &str,
        params: Option<&Map<String, Value>>,
        credential: Option<&SecretString>,
    ) -> Result<AgentOutcome, AgentSessionError> {
        let invocation = AgentInvocation::Message {
            prompt: prompt.to_string(),
        };
        self.invoke(agent_id, params, invocation, credential).await
    }

    async fn drive(
        &self,
        session: &mut AgentSession,
        url: &url::Url,
        invocation: AgentInvocation,
    ) -> Result<ToolOutput, AgentSessionError> {
        session.connect(url).await?;
        session.list_tools().await?;

        match invocation {
            AgentInvocation::Message { prompt } => session.send_message(&prompt).await,
            AgentInvocation::Tool {
                name,
                arguments,
                prompt,
            } => match session.call_tool(&name, arguments).await {
                Err(err @ AgentSessionError::Agent { .. }) if self.config.tool_fallback => {
                    warn!(tool = %name, "Tool call failed, falling back to message: {}", err);
                    session.send_message(&prompt).await
                }
                other => other,
            },
        }
    }
}
