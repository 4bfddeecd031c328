use crate::backends::{AgentBackend, ChatBackend};
use crate::config::Settings;
use crate::error::{StepError, StepFailure};
use chainflow_agent::{AgentClient, AgentInvocation};
use chainflow_direct::{ChatRequest, DirectClient};
use chainflow_protocol::{
    Message, RemoteAgentSpec, Role, SeedMessage, StepDefinition, StepDispatch, StepResult,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Executes one step against the backend it dispatches to
#[derive(Clone)]
pub struct StepExecutor {
    settings: Arc<Settings>,
    chat: Arc<dyn ChatBackend>,
    agents: Arc<dyn AgentBackend>,
}

impl StepExecutor {
    /// Build an executor over the real direct and agent clients
    pub fn new(settings: Arc<Settings>) -> Result<Self, StepFailure> {
        let chat = DirectClient::new(settings.direct_config())?;
        let agents = AgentClient::new(settings.agent_config());
        Ok(Self::with_backends(settings, Arc::new(chat), Arc::new(agents)))
    }

    /// Build an executor over arbitrary backends
    pub fn with_backends(
        settings: Arc<Settings>,
        chat: Arc<dyn ChatBackend>,
        agents: Arc<dyn AgentBackend>,
    ) -> Self {
        Self {
            settings,
            chat,
            agents,
        }
    }

    /// Settings the executor was built with
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run `step` with `context` as its input
    #[instrument(skip(self, step, context), fields(step = %step.name))]
    pub async fn execute(&self, step: &StepDefinition, context: &str) -> Result<StepResult, StepError> {
        let outcome = match step.dispatch() {
            StepDispatch::RemoteAgent(agent) => self.execute_agent(step, agent, context).await,
            StepDispatch::Direct { target } => self.execute_direct(step, target, context).await,
        };
        outcome.map_err(|source| StepError::new(step.name.clone(), source))
    }

    async fn execute_direct(
        &self,
        step: &StepDefinition,
        target: Option<&str>,
        context: &str,
    ) -> Result<StepResult, StepFailure> {
        let address = target.unwrap_or(self.settings.default_backend.as_str());
        let request = ChatRequest {
            messages: build_messages(step, context),
            tools: step.tools.clone(),
        };

        let bearer = if self.settings.is_trusted(address) {
            self.settings.agent_credential.as_ref()
        } else {
            None
        };
        info!(
            backend = address,
            authenticated = bearer.is_some(),
            messages = request.messages.len(),
            "Executing direct step"
        );

        let reply = self.chat.chat(address, &request, bearer).await?;
        Ok(StepResult {
            step_name: step.name.clone(),
            backend_label: address.to_string(),
            response: reply.message,
            raw_backend_payload: Some(reply.raw),
        })
    }

    async fn execute_agent(
        &self,
        step: &StepDefinition,
        agent: &RemoteAgentSpec,
        context: &str,
    ) -> Result<StepResult, StepFailure> {
        if !self.settings.remote_agents_enabled() {
            return Err(StepFailure::Config(
                "remote agent execution disabled".to_string(),
            ));
        }

        let invocation = match &agent.tool {
            Some(tool) => {
                let mut arguments = tool.arguments.clone();
                arguments
                    .entry("input")
                    .or_insert_with(|| Value::String(context.to_string()));
                AgentInvocation::Tool {
                    name: tool.name.clone(),
                    arguments,
                    prompt: context.to_string(),
                }
            }
            None => AgentInvocation::Message {
                prompt: context.to_string(),
            },
        };
        info!(agent_id = %agent.agent_id, "Executing remote agent step");

        let outcome = self
            .agents
            .invoke(&agent.agent_id, agent.params.as_ref(), invocation)
            .await?;
        debug!(tools = outcome.available_tools.len(), "Agent step completed");

        Ok(StepResult {
            step_name: step.name.clone(),
            backend_label: agent_label(&outcome.agent_id),
            response: Message::from_text(Role::Assistant, outcome.response.clone()),
            raw_backend_payload: Some(outcome.to_payload()),
        })
    }
}

/// Seed messages in order, then the context with the step's role
pub fn build_messages(step: &StepDefinition, context: &str) -> Vec<Message> {
    step.seed_messages
        .iter()
        .map(SeedMessage::to_message)
        .chain(std::iter::once(Message::from_text(step.role.into(), context)))
        .collect()
}

/// Result label for a remote agent step
pub fn agent_label(agent_id: &str) -> String {
    format!("agent:{agent_id}")
}
