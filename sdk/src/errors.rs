//! Error types and handling
//!
//! This module provides the error types used throughout the Deskpilot engine.
//! All errors implement the `PilotErrorExt` trait which provides operator-safe
//! hints and indicates whether errors are recoverable.
//!
//! # Taxonomy
//!
//! - **Validation**: malformed action or provider payload, rejected before
//!   execution and never retried
//! - **Aborted**: cooperative cancellation of an in-flight provider call. Not a
//!   failure, never retried, never surfaced as a task failure
//! - **Transport**: network or provider fault, retried with backoff
//! - **SizeExceeded**: a payload could not be bounded; reported as a failed
//!   action, not a failed task
//! - **ToolExecution**: a desktop action failed; fed back to the model as an
//!   `is_error` tool result
//! - **Fatal**: retry budget exhausted or unrecoverable state. The only kind
//!   that forces a task into FAILED

use thiserror::Error;

/// Trait for Deskpilot error extensions
///
/// Provides additional context for errors, including operator-facing hints
/// and recoverability information.
pub trait PilotErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint is safe to display to operators and never contains typed
    /// text, API keys or raw driver output.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors stay inside the control loop and are fed back as
    /// conversational data. Non-recoverable errors end the current attempt.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, PilotErrorExt};
///
/// let error = EngineError::Validation("clickCount must be at least 1".into());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Fatal("retry budget exhausted".into());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Action and payload errors
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    #[error("Payload size exceeded: {size} bytes > {limit} bytes")]
    SizeExceeded { size: usize, limit: usize },

    // Provider errors
    #[error("Provider call aborted")]
    Aborted,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Fatal error: {0}")]
    Fatal(String),

    // Task state machine errors
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid task transition: {0}")]
    InvalidTransition(String),

    #[error("Control unavailable: {0}")]
    ControlUnavailable(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PilotErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Validation(_) => "The requested action was malformed and was not executed",
            Self::ToolExecution(_) => "The desktop action failed. The agent may retry differently",
            Self::SizeExceeded { .. } => "The screenshot could not be reduced below the size limit",

            Self::Aborted => "The request was cancelled",
            Self::Transport(_) => "Model provider unavailable. Check your API key and network",
            Self::Fatal(_) => "The task could not continue. See the task error for details",

            Self::TaskNotFound(_) => "No task with that id exists",
            Self::InvalidTransition(_) => "The task is not in a state that allows this operation",
            Self::ControlUnavailable(_) => "Control of this task cannot change right now",

            Self::Config(_) => "Check your config.toml file for errors",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::Fatal(_) | Self::TaskNotFound(_) | Self::Config(_) => false,

            // Aborted is a deliberate stop rather than a fault.
            Self::Aborted => false,

            _ => true,
        }
    }
}
