//! Effects produced by state transitions

use super::TaskHandle;
use crate::llm::{Prompt, ToolUseRequest};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fork an LLM request. The runtime attaches the tool configuration.
    RequestLlm { task: TaskHandle, prompt: Prompt },

    /// Fork one tool execution
    ExecuteTool {
        task: TaskHandle,
        request: ToolUseRequest,
    },

    /// Interrupt in-flight tasks without waiting for them
    Interrupt { tasks: Vec<TaskHandle> },
}
