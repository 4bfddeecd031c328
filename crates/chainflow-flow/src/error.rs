use chainflow_agent::AgentSessionError;
use chainflow_direct::BackendError;
use thiserror::Error;

/// Why a single step failed
#[derive(Debug, Error)]
pub enum StepFailure {
    /// Missing or invalid static configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backend could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// A direct backend answered with a non-success status
    #[error("Backend returned HTTP {status}: {body}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Redacted response body
        body: String,
    },

    /// A remote agent reported an application-level failure
    #[error("Agent {agent_id} failed{}: {message}", tool_suffix(.tool_name))]
    Agent {
        /// Normalized agent id
        agent_id: String,
        /// Capability being called, if any
        tool_name: Option<String>,
        /// Failure reported by the agent
        message: String,
    },
}

fn tool_suffix(tool_name: &Option<String>) -> String {
    tool_name
        .as_deref()
        .map(|t| format!(" calling {t}"))
        .unwrap_or_default()
}

impl StepFailure {
    /// Short classification used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            StepFailure::Config(_) => "config",
            StepFailure::Connection(_) => "connection",
            StepFailure::Backend { .. } => "backend",
            StepFailure::Agent { .. } => "agent",
        }
    }
}

impl From<BackendError> for StepFailure {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Status { status, body } => StepFailure::Backend { status, body },
            BackendError::Connection { .. } | BackendError::Timeout { .. } => {
                StepFailure::Connection(err.to_string())
            }
            // A 2xx answer that is not a message is still the backend misbehaving
            BackendError::Decode { .. } => StepFailure::Backend {
                status: 200,
                body: err.to_string(),
            },
            BackendError::InvalidAddress { .. }
            | BackendError::InvalidCredential(_)
            | BackendError::Client(_) => StepFailure::Config(err.to_string()),
        }
    }
}

impl From<AgentSessionError> for StepFailure {
    fn from(err: AgentSessionError) -> Self {
        match err {
            AgentSessionError::Config(message) => StepFailure::Config(message),
            AgentSessionError::Connection { .. } => StepFailure::Connection(err.to_string()),
            AgentSessionError::Agent {
                agent_id,
                tool_name,
                message,
                ..
            } => StepFailure::Agent {
                agent_id,
                tool_name,
                message,
            },
            AgentSessionError::InvalidState { .. } => StepFailure::Config(err.to_string()),
        }
    }
}

/// A step failure tagged with the step's name
#[derive(Debug, Error)]
#[error("Step '{step_name}' failed: {source}")]
pub struct StepError {
    /// Name of the failing step
    pub step_name: String,
    /// Underlying failure
    #[source]
    pub source: StepFailure,
}

impl StepError {
    /// Tag `source` with `step_name`
    pub fn new(step_name: impl Into<String>, source: impl Into<StepFailure>) -> Self {
        Self {
            step_name: step_name.into(),
            source: source.into(),
        }
    }
}

/// Workflow-level failure; no partial results accompany it
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The request was rejected before any step ran
    #[error("Invalid workflow request: {0}")]
    InvalidRequest(String),

    /// A step failed and the run was aborted
    #[error("Workflow failed at step {step_index} ('{step_name}'): {source}")]
    Step {
        /// Zero-based index of the failing step
        step_index: usize,
        /// Name of the failing step
        step_name: String,
        /// Underlying step error
        #[source]
        source: StepError,
    },

    /// The run was cancelled while a step was in flight
    #[error("Workflow cancelled at step {step_index} ('{step_name}')")]
    Cancelled {
        /// Zero-based index of the interrupted step
        step_index: usize,
        /// Name of the interrupted step
        step_name: String,
    },
}

impl WorkflowError {
    /// Index of the step that failed or was interrupted
    pub fn step_index(&self) -> Option<usize> {
        match self {
            WorkflowError::InvalidRequest(_) => None,
            WorkflowError::Step { step_index, .. } | WorkflowError::Cancelled { step_index, .. } => {
                Some(*step_index)
            }
        }
    }

    /// Name of the step that failed or was interrupted
    pub fn step_name(&self) -> Option<&str> {
        match self {
            WorkflowError::InvalidRequest(_) => None,
            WorkflowError::Step { step_name, .. } | WorkflowError::Cancelled { step_name, .. } => {
                Some(step_name)
            }
        }
    }

    /// Underlying step failure, if a step failed
    pub fn failure(&self) -> Option<&StepFailure> {
        match self {
            WorkflowError::Step { source, .. } => Some(&source.source),
            _ => None,
        }
    }
}
