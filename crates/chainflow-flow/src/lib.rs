//! Chainflow Flow - workflow execution engine
//!
//! Runs an ordered list of steps, dispatching each to a direct chat backend
//! or a remote agent, and threads the text each step produces into the next.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainflow_flow::{Settings, WorkflowEngine};
//! use chainflow_protocol::{StepDefinition, WorkflowRequest};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = WorkflowEngine::from_settings(Arc::new(Settings::from_env()))?;
//! let request = WorkflowRequest {
//!     steps: vec![StepDefinition::new("greet")],
//!     input: "Hello".to_string(),
//! };
//! let result = engine.run(&request).await?;
//! println!("{:?}", result.final_text());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Backend seams used by the executor
pub mod backends;
/// Backend listing
pub mod catalog;
/// Process-wide settings
pub mod config;
/// Workflow engine
pub mod engine;
/// Step, workflow and failure types
pub mod error;
/// Single-step execution
pub mod executor;

#[cfg(test)]
mod testing;

pub use backends::{AgentBackend, ChatBackend};
pub use catalog::BackendCatalog;
pub use config::Settings;
pub use engine::WorkflowEngine;
pub use error::{StepError, StepFailure, WorkflowError};
pub use executor::StepExecutor;
