//! Conversation Adapter
//!
//! Maps a task's message history to a [`ProviderRequest`] and the provider's
//! reply back to content blocks. The adapter owns three request-shaping rules:
//!
//! - USER messages made only of ToolUse blocks are left out of the request.
//! - The last block of the last message, the last tool declaration and the
//!   system prompt carry an ephemeral cache hint.
//! - Reply blocks of an unknown type become a Text block holding their JSON.
//!
//! Each call races the provider against the task's cancellation token and a
//! per-call timeout. Retrying is the control loop's business.

use sdk::{ContentBlock, Role};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    CacheControl, LLMError, LLMProvider, ProviderRequest, RequestBlock, RequestMessage, Result,
    SystemPrompt, ToolDeclaration,
};
use crate::task::Message;

/// Default ceiling on output tokens per call
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 8192;

/// Default upper bound on one provider call
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

pub struct ConversationAdapter {
    provider: Arc<dyn LLMProvider>,
    system_prompt: String,
    tools: Vec<ToolDeclaration>,
    max_output_tokens: u32,
    request_timeout: Duration,
}

impl ConversationAdapter {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        system_prompt: impl Into<String>,
        tools: Vec<ToolDeclaration>,
    ) -> Self {
        Self {
            provider,
            system_prompt: system_prompt.into(),
            tools,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Build the provider request for `messages`.
    pub fn build_request(
        &self,
        messages: &[Message],
        model: &str,
        cancellation: CancellationToken,
    ) -> ProviderRequest {
        let mut tools = self.tools.clone();
        for tool in tools.iter_mut() {
            tool.cache_control = None;
        }
        if let Some(last) = tools.last_mut() {
            last.cache_control = Some(CacheControl::Ephemeral);
        }

        ProviderRequest {
            model: model.to_string(),
            max_output_tokens: self.max_output_tokens,
            system_prompt: SystemPrompt {
                text: self.system_prompt.clone(),
                cache_control: Some(CacheControl::Ephemeral),
            },
            messages: request_messages(messages),
            tools,
            cancellation,
        }
    }

    /// Ask the provider for the assistant's next turn.
    ///
    /// Fails with [`LLMError::Aborted`] as soon as `cancellation` fires, even
    /// mid-call. A call exceeding the timeout is a transport fault.
    pub async fn send(
        &self,
        messages: &[Message],
        model: &str,
        cancellation: &CancellationToken,
    ) -> Result<Vec<ContentBlock>> {
        if cancellation.is_cancelled() {
            return Err(LLMError::Aborted);
        }

        let request = self.build_request(messages, model, cancellation.clone());
        debug!(
            provider = self.provider.name(),
            model = %model,
            messages = request.messages.len(),
            "Sending provider request"
        );

        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                debug!("Provider call aborted by cancellation");
                Err(LLMError::Aborted)
            }
            result = tokio::time::timeout(self.request_timeout, self.provider.generate(&request)) => {
                match result {
                    Ok(Ok(response)) => {
                        debug!(
                            blocks = response.content.len(),
                            stop_reason = ?response.stop_reason,
                            "Provider replied"
                        );
                        Ok(decode_response_blocks(response.content))
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(LLMError::Transport(format!(
                        "provider call timed out after {}s",
                        self.request_timeout.as_secs()
                    ))),
                }
            }
        }
    }
}

/// Convert task messages into request messages with cache hints applied.
pub fn request_messages(messages: &[Message]) -> Vec<RequestMessage> {
    let mut out: Vec<RequestMessage> = messages
        .iter()
        .filter(|m| !(m.role == Role::User && m.is_tool_use_only()))
        .map(|m| RequestMessage {
            role: m.role,
            content: m
                .content
                .iter()
                .cloned()
                .map(|block| RequestBlock {
                    block,
                    cache_control: None,
                })
                .collect(),
        })
        .collect();

    if let Some(block) = out.last_mut().and_then(|m| m.content.last_mut()) {
        block.cache_control = Some(CacheControl::Ephemeral);
    }

    out
}

/// Decode raw reply blocks. Unknown kinds degrade to serialized text.
pub fn decode_response_blocks(blocks: Vec<Value>) -> Vec<ContentBlock> {
    blocks.into_iter().map(decode_block).collect()
}

fn decode_block(raw: Value) -> ContentBlock {
    let kind = raw.get("type").and_then(Value::as_str).unwrap_or_default();

    let decoded = match kind {
        "text" => raw
            .get("text")
            .and_then(Value::as_str)
            .map(ContentBlock::text),
        "tool_use" => match (
            raw.get("id").and_then(Value::as_str),
            raw.get("name").and_then(Value::as_str),
        ) {
            (Some(id), Some(name)) => Some(ContentBlock::tool_use(
                id,
                name,
                raw.get("input").cloned().unwrap_or_else(|| Value::Object(Default::default())),
            )),
            _ => None,
        },
        _ => None,
    };

    decoded.unwrap_or_else(|| {
        warn!(block_type = %kind, "Unrecognized reply block kept as text");
        ContentBlock::text(raw.to_string())
    })
}
