//! Anthropic Messages API gateway

use super::types::*;
use super::{LlmError, LlmGateway};
use crate::config::{ConfigError, LlmConfig};
use crate::tools::{ToolResultContent, ToolStatus};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic gateway implementation
pub struct AnthropicGateway {
    client: Client,
    api_key: String,
    base_url: String,
    model_id: String,
    max_tokens: u32,
}

impl AnthropicGateway {
    pub fn new(config: &LlmConfig) -> Result<Self, ConfigError> {
        // In gateway mode the proxy handles authentication
        let api_key = match (&config.api_key, &config.gateway) {
            (Some(key), _) if !key.is_empty() => key.clone(),
            (_, Some(_)) => "implicit".to_string(),
            _ => return Err(ConfigError::Missing("ANTHROPIC_API_KEY")),
        };

        let base_url = match &config.gateway {
            Some(gw) => format!("{}/_/gateway/anthropic/v1/messages", gw.trim_end_matches('/')),
            None => API_URL.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            api_key,
            base_url,
            model_id: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn translate_request(&self, prompt: &Prompt) -> AnthropicRequest {
        let system = vec![AnthropicSystemBlock {
            r#type: "text".to_string(),
            text: prompt.system.clone(),
            cache_control: Some(CacheControl {
                r#type: "ephemeral".to_string(),
            }),
        }];

        let messages: Vec<AnthropicMessage> = prompt
            .messages
            .iter()
            .filter_map(translate_message)
            .collect();

        let tools: Vec<AnthropicTool> = prompt
            .tool_config
            .iter()
            .flat_map(|config| config.tools.iter())
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.input_schema.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: self.max_tokens,
            system,
            messages,
            tools: if tools.is_empty() { None } else { Some(tools) },
        }
    }
}

/// Translate one prompt message; `None` when nothing sendable remains.
fn translate_message(msg: &PromptMessage) -> Option<AnthropicMessage> {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let content: Vec<AnthropicContentBlock> = msg
        .content
        .iter()
        .filter_map(|block| match block {
            // The API rejects empty text blocks
            ContentBlock::Text { text } if text.is_empty() => None,
            ContentBlock::Text { text } => Some(AnthropicContentBlock::Text { text: text.clone() }),
            ContentBlock::Image { source } => {
                let ImageSource::Base64 { media_type, data } = source;
                Some(AnthropicContentBlock::Image {
                    source: AnthropicSource::base64(media_type, data),
                })
            }
            ContentBlock::Document { name, source } => Some(AnthropicContentBlock::Document {
                title: name.clone(),
                source: match source {
                    DocumentSource::Base64 { media_type, data } => {
                        AnthropicSource::base64(media_type, data)
                    }
                    DocumentSource::Text { data } => AnthropicSource {
                        r#type: "text".to_string(),
                        media_type: "text/plain".to_string(),
                        data: data.clone(),
                    },
                },
            }),
            ContentBlock::ToolUse { id, name, input } => Some(AnthropicContentBlock::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            }),
            ContentBlock::ToolResult {
                tool_use_id,
                status,
                content,
            } => Some(AnthropicContentBlock::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.iter().map(translate_tool_result_content).collect(),
                is_error: *status == ToolStatus::Error,
            }),
        })
        .collect();

    if content.is_empty() {
        return None;
    }

    Some(AnthropicMessage {
        role: role.to_string(),
        content,
    })
}

fn translate_tool_result_content(block: &ToolResultContent) -> AnthropicToolResultBlock {
    match block {
        ToolResultContent::Text { text } => AnthropicToolResultBlock::Text { text: text.clone() },
        ToolResultContent::Json { value } => AnthropicToolResultBlock::Text {
            text: value.to_string(),
        },
        ToolResultContent::Image { source } => {
            let ImageSource::Base64 { media_type, data } = source;
            AnthropicToolResultBlock::Image {
                source: AnthropicSource::base64(media_type, data),
            }
        }
    }
}

fn normalize_response(resp: AnthropicResponse) -> LlmResponse {
    let content: Vec<ContentBlock> = resp
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                Some(ContentBlock::ToolUse { id, name, input })
            }
            AnthropicResponseBlock::Other => None,
        })
        .collect();

    let end_turn = resp.stop_reason.as_deref() == Some("end_turn");

    LlmResponse {
        content,
        end_turn,
        usage: Usage {
            input_tokens: resp.usage.input_tokens,
            output_tokens: resp.usage.output_tokens,
        },
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::auth(format!("Authentication failed: {body}")),
        429 => LlmError::rate_limit(format!("Rate limited: {body}")),
        400 => LlmError::invalid_request(format!("Invalid request: {body}")),
        500..=599 => LlmError::server_error(format!("Server error: {body}")),
        _ => LlmError::unknown(format!("HTTP {status}: {body}")),
    }
}

#[async_trait]
impl LlmGateway for AnthropicGateway {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        let anthropic_request = self.translate_request(prompt);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&anthropic_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let anthropic_response: AnthropicResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(normalize_response(anthropic_response))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    system: Vec<AnthropicSystemBlock>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicSystemBlock {
    r#type: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    r#type: String,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    Image {
        source: AnthropicSource,
    },
    Document {
        title: String,
        source: AnthropicSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Vec<AnthropicToolResultBlock>,
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicToolResultBlock {
    Text { text: String },
    Image { source: AnthropicSource },
}

#[derive(Debug, Serialize)]
struct AnthropicSource {
    r#type: String,
    media_type: String,
    data: String,
}

impl AnthropicSource {
    fn base64(media_type: &str, data: &str) -> Self {
        Self {
            r#type: "base64".to_string(),
            media_type: media_type.to_string(),
            data: data.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicResponseBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}
