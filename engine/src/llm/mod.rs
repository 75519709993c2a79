//! Model provider abstraction
//!
//! The [`LLMProvider`] trait is the seam between the control loop and a
//! concrete model API. Providers receive a fully built [`ProviderRequest`]
//! (system prompt, messages and tool declarations, each already carrying
//! their cache hints) and return the raw content blocks of the assistant's
//! turn. Mapping those blocks back into [`sdk::ContentBlock`]s is the
//! [`ConversationAdapter`]'s job.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::{ContentBlock, Role};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

pub mod adapter;
pub mod anthropic;
pub mod prompt;

pub use adapter::ConversationAdapter;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum LLMError {
    /// The call was cancelled through its cancellation token
    #[error("Provider call aborted")]
    Aborted,

    /// Network fault, timeout, rate limit or provider-side outage
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl LLMError {
    /// Only transport faults are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LLMError::Transport(_))
    }
}

impl From<LLMError> for EngineError {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::Aborted => EngineError::Aborted,
            LLMError::Transport(msg) => EngineError::Transport(msg),
            LLMError::AuthenticationFailed(msg) => {
                EngineError::Fatal(format!("authentication failed: {}", msg))
            }
            LLMError::InvalidRequest(msg) => EngineError::Validation(msg),
            LLMError::MalformedResponse(msg) => EngineError::Validation(msg),
        }
    }
}

/// Prompt-cache directive attached to a request element
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CacheControl {
    Ephemeral,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemPrompt {
    pub text: String,
    pub cache_control: Option<CacheControl>,
}

/// One content block of an outgoing message
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBlock {
    pub block: ContentBlock,
    pub cache_control: Option<CacheControl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequestMessage {
    pub role: Role,
    pub content: Vec<RequestBlock>,
}

/// A tool the model may call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Everything a provider needs for one round-trip
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub max_output_tokens: u32,
    pub system_prompt: SystemPrompt,
    pub messages: Vec<RequestMessage>,
    pub tools: Vec<ToolDeclaration>,
    pub cancellation: CancellationToken,
}

/// The assistant's turn as returned by the provider.
///
/// Blocks stay in their raw JSON form (tagged by `type`) until the adapter
/// decodes them, so unknown block kinds survive the trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderResponse {
    pub content: Vec<serde_json::Value>,
    pub stop_reason: Option<String>,
}

/// LLM Provider trait that all providers must implement
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g. "anthropic")
    fn name(&self) -> &str;

    /// Generate the assistant's next turn.
    ///
    /// Implementations need not watch `request.cancellation` themselves: the
    /// adapter drops the returned future when the token fires.
    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Check if the provider is currently healthy and available
    async fn check_health(&self) -> bool {
        true
    }
}
