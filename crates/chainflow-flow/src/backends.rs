//! Seams between the step executor and the concrete backend clients.

use async_trait::async_trait;
use chainflow_agent::{AgentClient, AgentInvocation, AgentOutcome, AgentSessionError};
use chainflow_direct::{BackendError, ChatRequest, DirectClient, DirectReply};
use secrecy::SecretString;
use serde_json::{Map, Value};

/// A direct chat-completion backend
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Send `request` to `address`, authenticated with `bearer` when given
    async fn chat(
        &self,
        address: &str,
        request: &ChatRequest,
        bearer: Option<&SecretString>,
    ) -> Result<DirectReply, BackendError>;
}

/// A remote tool-capable agent
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Open a session with `agent_id`, run `invocation`, close the session
    async fn invoke(
        &self,
        agent_id: &str,
        params: Option<&Map<String, Value>>,
        invocation: AgentInvocation,
    ) -> Result<AgentOutcome, AgentSessionError>;
}

#[async_trait]
impl ChatBackend for DirectClient {
    async fn chat(
        &self,
        address: &str,
        request: &ChatRequest,
        bearer: Option<&SecretString>,
    ) -> Result<DirectReply, BackendError> {
        DirectClient::invoke(self, address, request, bearer).await
    }
}

#[async_trait]
impl AgentBackend for AgentClient {
    async fn invoke(
        &self,
        agent_id: &str,
        params: Option<&Map<String, Value>>,
        invocation: AgentInvocation,
    ) -> Result<AgentOutcome, AgentSessionError> {
        AgentClient::invoke(self, agent_id, params, invocation, None).await
    }
}
