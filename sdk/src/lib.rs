//! Deskpilot SDK
//!
//! Shared vocabulary for Deskpilot components: conversation content blocks,
//! typed desktop actions, the uniform tool result envelope, and the error
//! taxonomy. Used by the engine and by external tool-calling runtimes.

/// Typed desktop actions and their validation
pub mod action;

/// Error types and handling
pub mod errors;

/// Content blocks and tool result envelopes
pub mod types;

// Re-export commonly used types
pub use action::{Action, Button, Coordinates, PressType, ScrollDirection};
pub use errors::{EngineError, PilotErrorExt};
pub use types::{ContentBlock, Role, ToolEnvelope};
