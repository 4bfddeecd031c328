use crate::session::SessionState;
use thiserror::Error;

/// Phase of an agent session in which an application-level failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// `initialize` handshake
    Initialize,
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool,
    /// `message/send`
    SendMessage,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Initialize => write!(f, "initialize"),
            SessionPhase::ListTools => write!(f, "capability listing"),
            SessionPhase::CallTool => write!(f, "tool call"),
            SessionPhase::SendMessage => write!(f, "message send"),
        }
    }
}

/// Errors surfaced by agent sessions
#[derive(Debug, Error)]
pub enum AgentSessionError {
    /// Missing agent id, credential or prompt, or an unusable server address
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure reaching the agent, including timeouts and dropped sockets
    #[error("Connection to agent {agent_id} failed: {message}")]
    Connection {
        /// Normalized agent id
        agent_id: String,
        /// Transport error
        message: String,
    },

    /// The agent answered with an application-level failure
    #[error("Agent {agent_id} failed during {phase}: {message}")]
    Agent {
        /// Normalized agent id
        agent_id: String,
        /// Session phase that failed
        phase: SessionPhase,
        /// Capability name for tool calls
        tool_name: Option<String>,
        /// Failure reported by the agent
        message: String,
    },

    /// A session operation was attempted out of order
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        /// Operation attempted
        operation: &'static str,
        /// State the session was in
        state: SessionState,
    },
}

impl AgentSessionError {
    /// Agent id attached to the error, if any
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AgentSessionError::Connection { agent_id, .. }
            | AgentSessionError::Agent { agent_id, .. } => Some(agent_id),
            AgentSessionError::Config(_) | AgentSessionError::InvalidState { .. } => None,
        }
    }
}
