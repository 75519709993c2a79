use super::{
    CacheControl, LLMError, LLMProvider, ProviderRequest, ProviderResponse, RequestBlock,
    ToolDeclaration,
};
use crate::config::AnthropicConfig;
use async_trait::async_trait;
use sdk::{ContentBlock, Role};
use serde_json::{json, Value};

pub struct AnthropicProvider {
    config: AnthropicConfig,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(config: AnthropicConfig, api_key: impl Into<String>) -> Self {
        Self {
            config,
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    /// Read the API key from the environment variable named in the config.
    pub fn from_env(config: AnthropicConfig) -> super::Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            LLMError::AuthenticationFailed(format!(
                "environment variable {} is not set",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(config, api_key))
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn check_health(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, request: &ProviderRequest) -> super::Result<ProviderResponse> {
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let payload = build_payload(request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.config.version)
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| LLMError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => LLMError::AuthenticationFailed(text),
                400 | 404 | 413 | 422 => LLMError::InvalidRequest(format!("{}: {}", status, text)),
                _ => LLMError::Transport(format!("{}: {}", status, text)),
            });
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| LLMError::MalformedResponse(e.to_string()))?;

        parse_response(data)
    }
}

/// Build the Messages API payload for a request.
pub fn build_payload(request: &ProviderRequest) -> Value {
    let mut system = json!({
        "type": "text",
        "text": request.system_prompt.text,
    });
    attach_cache_control(&mut system, request.system_prompt.cache_control);

    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|message| {
            json!({
                "role": match message.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": message.content.iter().map(request_block).collect::<Vec<_>>(),
            })
        })
        .collect();

    let tools: Vec<Value> = request.tools.iter().map(tool_declaration).collect();

    json!({
        "model": request.model,
        "max_tokens": request.max_output_tokens,
        "system": [system],
        "messages": messages,
        "tools": tools,
    })
}

fn parse_response(data: Value) -> super::Result<ProviderResponse> {
    let content = data
        .get("content")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| LLMError::MalformedResponse("No content array in response".to_string()))?;

    Ok(ProviderResponse {
        content,
        stop_reason: data
            .get("stop_reason")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn request_block(block: &RequestBlock) -> Value {
    let mut value = content_block(&block.block);
    attach_cache_control(&mut value, block.cache_control);
    value
}

fn content_block(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => json!({"type": "text", "text": text}),
        ContentBlock::Image { mime_type, data } => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": mime_type, "data": data},
        }),
        ContentBlock::ToolUse { id, name, input } => json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content.iter().map(content_block).collect::<Vec<_>>(),
            "is_error": is_error,
        }),
    }
}

fn tool_declaration(tool: &ToolDeclaration) -> Value {
    let mut value = json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    });
    attach_cache_control(&mut value, tool.cache_control);
    value
}

fn attach_cache_control(value: &mut Value, cache_control: Option<CacheControl>) {
    if let (Some(cache), Value::Object(map)) = (cache_control, value) {
        map.insert("cache_control".to_string(), json!(cache));
    }
}
