//! Prompt reconstruction from the event log
//!
//! The prompt is rebuilt from scratch for every LLM request, so discarding an
//! event takes effect on the very next turn.

use crate::context::ConversationContext;
use crate::event_log::{Event, EventLog};
use crate::llm::{ContentBlock, Prompt, PromptMessage, Role};

/// Base system prompt establishing the assistant's role
pub const DEFAULT_SYSTEM_PROMPT: &str = r"You are a helpful AI assistant with access to tools. Use tools when they help answer the user's question.

Be concise in your responses. When using tools, explain briefly what you are doing.";

/// Sent as the only message when nothing in the log is eligible
const EMPTY_CONVERSATION_GREETING: &str = "Hello";

/// Derive the prompt for the next LLM call.
///
/// Plain messages come first in log order, followed by one
/// invocation/result pair per tool use. Discarded events and non-text
/// message content are left out.
pub fn build_prompt(system: &str, events: &EventLog) -> Prompt {
    let mut messages = Vec::new();
    let mut tool_messages = Vec::new();

    for event in events.active() {
        match event {
            Event::Message(m) => {
                let Some(text) = m.content.as_text() else {
                    continue;
                };
                messages.push(PromptMessage {
                    role: m.role,
                    content: vec![ContentBlock::text(text)],
                });
            }
            Event::ToolUse(t) => {
                tool_messages.push(PromptMessage {
                    role: Role::Assistant,
                    content: vec![ContentBlock::tool_use(
                        t.tool_use_id.clone(),
                        t.name.clone(),
                        t.input.clone(),
                    )],
                });
                tool_messages.push(PromptMessage {
                    role: Role::User,
                    content: vec![ContentBlock::ToolResult {
                        tool_use_id: t.tool_use_id.clone(),
                        status: t.result.status,
                        content: t.result.content.clone(),
                    }],
                });
            }
        }
    }

    messages.extend(tool_messages);
    if messages.is_empty() {
        messages.push(PromptMessage::user(ContentBlock::text(
            EMPTY_CONVERSATION_GREETING,
        )));
    }

    Prompt {
        system: system.to_string(),
        messages,
        tool_config: None,
    }
}

/// Put ambient context in front of the conversation.
///
/// The block opens the first user message, or becomes a user message of its
/// own when the prompt starts with the assistant. An empty context leaves the
/// prompt untouched.
pub fn inject_context(mut prompt: Prompt, context: &ConversationContext) -> Prompt {
    if context.is_empty() {
        return prompt;
    }

    let block = ContentBlock::text(format!(
        "<context>\n{}\n</context>",
        context.messages.join("\n")
    ));
    match prompt.messages.first_mut() {
        Some(first) if first.role == Role::User => first.content.insert(0, block),
        _ => prompt.messages.insert(0, PromptMessage::user(block)),
    }
    prompt
}
