//! Chainflow Protocol - message and workflow types
//!
//! Shared wire definitions used by every chainflow crate: the message shape
//! exchanged with backends, the step and workflow request types, and the
//! per-step result records returned to callers.
//!
//! # Core Types
//!
//! - [`Message`] - a role plus tagged content parts
//! - [`StepDefinition`] - one stage of a workflow
//! - [`WorkflowRequest`] / [`WorkflowResult`] - submission and outcome
//!
//! # Example
//!
//! ```rust
//! use chainflow_protocol::{Message, Role};
//!
//! let message = Message::from_text(Role::User, "What's the weather like in Oslo?");
//! assert_eq!(message.text(), "What's the weather like in Oslo?");
//! ```

#![warn(missing_docs)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Protocol models module
pub mod models;

pub use models::*;
