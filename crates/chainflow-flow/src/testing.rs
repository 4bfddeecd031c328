//! Recording backends for unit tests.

use crate::backends::{AgentBackend, ChatBackend};
use async_trait::async_trait;
use chainflow_agent::{normalize_agent_id, AgentInvocation, AgentOutcome, AgentSessionError};
use chainflow_direct::{BackendError, ChatRequest, DirectReply};
use chainflow_protocol::{Message, Role};
use secrecy::SecretString;
use serde_json::{json, Map, Value};
use std::sync::Mutex;

type ChatReply = Box<dyn Fn(usize, &ChatRequest) -> Result<String, BackendError> + Send + Sync>;

#[derive(Debug, Clone)]
pub(crate) struct ChatCall {
    pub address: String,
    pub request: ChatRequest,
    pub authenticated: bool,
}

pub(crate) struct RecordingChat {
    reply: ChatReply,
    hang: bool,
    calls: Mutex<Vec<ChatCall>>,
}

impl RecordingChat {
    fn with_reply(reply: ChatReply) -> Self {
        Self {
            reply,
            hang: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::with_reply(Box::new(move |_, _| Ok(text.clone())))
    }

    /// Answers `"<last message text>-><index>"`
    pub fn tagging() -> Self {
        Self::with_reply(Box::new(|index, request| {
            let last = request.messages.last().map(Message::text).unwrap_or_default();
            Ok(format!("{last}->{index}"))
        }))
    }

    /// Like [`RecordingChat::tagging`] but call `fail_at` answers HTTP 500
    pub fn failing_at(fail_at: usize) -> Self {
        Self::with_reply(Box::new(move |index, request| {
            if index == fail_at {
                return Err(BackendError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            let last = request.messages.last().map(Message::text).unwrap_or_default();
            Ok(format!("{last}->{index}"))
        }))
    }

    /// Never answers
    pub fn hanging() -> Self {
        let mut chat = Self::replying("unreachable");
        chat.hang = true;
        chat
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for RecordingChat {
    async fn chat(
        &self,
        address: &str,
        request: &ChatRequest,
        bearer: Option<&SecretString>,
    ) -> Result<DirectReply, BackendError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(ChatCall {
                address: address.to_string(),
                request: request.clone(),
                authenticated: bearer.is_some(),
            });
            calls.len() - 1
        };

        if self.hang {
            std::future::pending::<()>().await;
        }

        let text = (self.reply)(index, request)?;
        let message = Message::from_text(Role::Assistant, text);
        Ok(DirectReply {
            raw: json!({ "message": message }),
            message,
        })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct AgentCall {
    pub agent_id: String,
    pub params: Option<Map<String, Value>>,
    pub invocation: AgentInvocation,
}

#[derive(Default)]
pub(crate) struct RecordingAgents {
    response: String,
    calls: Mutex<Vec<AgentCall>>,
}

impl RecordingAgents {
    pub fn replying(text: &str) -> Self {
        Self {
            response: text.to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<AgentCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AgentBackend for RecordingAgents {
    async fn invoke(
        &self,
        agent_id: &str,
        params: Option<&Map<String, Value>>,
        invocation: AgentInvocation,
    ) -> Result<AgentOutcome, AgentSessionError> {
        self.calls.lock().unwrap().push(AgentCall {
            agent_id: agent_id.to_string(),
            params: params.cloned(),
            invocation,
        });

        let agent = normalize_agent_id(agent_id)?;
        Ok(AgentOutcome {
            agent_id: agent.to_string(),
            available_tools: vec!["forecast".to_string()],
            response: self.response.clone(),
            raw_response: json!({ "text": self.response }),
        })
    }
}
