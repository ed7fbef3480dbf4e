//! Actions that drive state transitions

use super::TaskHandle;
use crate::event_log::EventId;
use crate::llm::{ContentBlock, LlmError, ToolUseRequest};
use crate::tools::ToolResult;

/// Input to the reducer, from the caller or from a completed task
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // Caller actions
    Ask {
        text: String,
    },
    Abort,
    Clear,
    Discard {
        id: EventId,
    },

    // Task completions
    LlmError {
        request: TaskHandle,
        error: LlmError,
    },
    LlmResponse {
        request: TaskHandle,
        /// Non-tool content blocks in response order
        content: Vec<ContentBlock>,
        tool_uses: Vec<ToolUseRequest>,
    },
    ToolResult {
        task: TaskHandle,
        tool_use_id: String,
        /// `None` when the tool produced nothing (e.g. it was interrupted)
        result: Option<ToolResult>,
    },
}

impl Action {
    pub fn ask(text: impl Into<String>) -> Self {
        Action::Ask { text: text.into() }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Ask { .. } => "ask",
            Action::Abort => "abort",
            Action::Clear => "clear",
            Action::Discard { .. } => "discard",
            Action::LlmError { .. } => "llm_error",
            Action::LlmResponse { .. } => "llm_response",
            Action::ToolResult { .. } => "tool_result",
        }
    }
}
