//! Common types for LLM interactions

use crate::tools::{ToolResultContent, ToolStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prompt handed to the gateway: system text, ordered messages and the
/// optional tool declarations for this turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prompt {
    pub system: String,
    pub messages: Vec<PromptMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<ToolConfig>,
}

/// Message in a prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl PromptMessage {
    pub fn user(block: ContentBlock) -> Self {
        Self {
            role: Role::User,
            content: vec![block],
        }
    }

    pub fn assistant(block: ContentBlock) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![block],
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Content block in a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        source: ImageSource,
    },
    Document {
        name: String,
        source: DocumentSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        status: ToolStatus,
        content: Vec<ToolResultContent>,
    },
}

impl ContentBlock {
    pub fn text(s: impl Into<String>) -> Self {
        ContentBlock::Text { text: s.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Image source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    Base64 { media_type: String, data: String },
}

/// Document source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocumentSource {
    Base64 { media_type: String, data: String },
    Text { data: String },
}

/// Tool definition as declared to the LLM
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Backend-neutral tool configuration attached to a prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolConfig {
    pub tools: Vec<ToolDefinition>,
}

/// A structured request from the LLM to run a named tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseRequest {
    /// Correlation id pairing this request with its eventual result
    pub tool_use_id: String,
    pub name: String,
    pub input: Value,
}

/// LLM response
#[derive(Debug, Clone, Serialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub end_turn: bool,
    pub usage: Usage,
}

impl LlmResponse {
    /// Split the response into non-tool content and tool use requests,
    /// preserving the order of each.
    pub fn partition(self) -> (Vec<ContentBlock>, Vec<ToolUseRequest>) {
        let mut content = Vec::new();
        let mut tool_uses = Vec::new();
        for block in self.content {
            match block {
                ContentBlock::ToolUse { id, name, input } => tool_uses.push(ToolUseRequest {
                    tool_use_id: id,
                    name,
                    input,
                }),
                other => content.push(other),
            }
        }
        (content, tool_uses)
    }

    /// Get text content from the response
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Usage statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
