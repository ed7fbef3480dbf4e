//! Think tool - lets the assistant write down reasoning without side effects

use super::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

/// Built-in scratchpad tool
pub struct ThinkTool;

#[derive(Debug, Deserialize)]
struct ThinkInput {
    thoughts: String,
}

#[async_trait]
impl Tool for ThinkTool {
    fn name(&self) -> &str {
        "think"
    }

    fn description(&self) -> Option<String> {
        Some(
            "Think through a problem before answering or calling another tool. \
             Nothing is executed and the user does not see the thoughts."
                .to_string(),
        )
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["thoughts"],
            "properties": {
                "thoughts": {
                    "type": "string",
                    "description": "The thoughts, notes, or plans to record"
                }
            }
        })
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Option<ToolResult> {
        match serde_json::from_value::<ThinkInput>(input) {
            Ok(input) => {
                tracing::debug!(
                    tool_use_id = %ctx.tool_use_id,
                    chars = input.thoughts.len(),
                    "thoughts recorded"
                );
                Some(ToolResult::success_text("recorded"))
            }
            Err(e) => Some(ToolResult::error_text(format!("Invalid input: {e}"))),
        }
    }
}
