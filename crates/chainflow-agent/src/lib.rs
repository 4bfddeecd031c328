//! Remote Agent Sessions
//!
//! Connects to tool-capable agents over a WebSocket JSON-RPC session,
//! enumerates their capabilities, and either sends a free-text message or
//! calls a named capability. Every session is scoped to one invocation and
//! closed on every exit path.

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Capability-list parsing
pub mod capabilities;
/// Session lifecycle driver
pub mod client;
/// Error types
pub mod error;
/// Agent identifier normalization and session URLs
pub mod identifier;
/// Remote agent registry discovery
pub mod registry;
/// WebSocket JSON-RPC session
pub mod session;

pub use capabilities::parse_capability_names;
pub use client::{AgentClient, AgentClientConfig, AgentInvocation, AgentOutcome};
pub use error::{AgentSessionError, SessionPhase};
pub use identifier::{normalize_agent_id, redact_url, session_url, NormalizedAgentId};
pub use registry::{RegistryClient, RegistryError};
pub use session::{AgentSession, SessionState, ToolOutput};
