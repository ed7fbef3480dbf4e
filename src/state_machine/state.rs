//! Conversation state types

use crate::event_log::EventLog;
use crate::llm::{LlmError, LlmErrorKind};
use crate::runtime::{Clock, IdGenerator};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Task handles
// ============================================================================

/// Identity of a forked LLM or tool task.
///
/// Recorded in state when the task is forked and echoed back by its
/// completion action, so completions from superseded tasks can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(Uuid);

impl TaskHandle {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// Tool calls and errors
// ============================================================================

/// A tool invocation that has been forked but not yet resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub input: Value,
    pub task: TaskHandle,
}

/// Error surfaced to the user after a failed turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub kind: LlmErrorKind,
}

impl ConversationError {
    pub fn llm(error: &LlmError) -> Self {
        Self {
            message: "Error while calling LLM".to_string(),
            details: Some(error.message.clone()),
            kind: error.kind,
        }
    }
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {details}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Conversation state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum State {
    /// Ready for user input, no pending operations
    Idle {
        events: EventLog,
        timestamp: DateTime<Utc>,
        error: Option<ConversationError>,
    },

    /// LLM request in flight
    WaitingForAssistant {
        events: EventLog,
        timestamp: DateTime<Utc>,
        request: TaskHandle,
    },

    /// Tool calls in flight, keyed by correlation id
    ToolUse {
        events: EventLog,
        timestamp: DateTime<Utc>,
        calls: HashMap<String, ToolCall>,
    },
}

impl State {
    /// Empty idle conversation
    pub fn initial(timestamp: DateTime<Utc>) -> Self {
        State::Idle {
            events: EventLog::new(),
            timestamp,
            error: None,
        }
    }

    pub fn events(&self) -> &EventLog {
        match self {
            State::Idle { events, .. }
            | State::WaitingForAssistant { events, .. }
            | State::ToolUse { events, .. } => events,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            State::Idle { timestamp, .. }
            | State::WaitingForAssistant { timestamp, .. }
            | State::ToolUse { timestamp, .. } => *timestamp,
        }
    }

    pub fn error(&self) -> Option<&ConversationError> {
        match self {
            State::Idle { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, State::Idle { .. })
    }

    /// Handles of every task this state is waiting on
    pub fn outstanding_tasks(&self) -> Vec<TaskHandle> {
        match self {
            State::Idle { .. } => vec![],
            State::WaitingForAssistant { request, .. } => vec![*request],
            State::ToolUse { calls, .. } => calls.values().map(|c| c.task).collect(),
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            State::Idle { .. } => "idle",
            State::WaitingForAssistant { .. } => "waiting_for_assistant",
            State::ToolUse { .. } => "tool_use",
        }
    }
}

// ============================================================================
// Transition context
// ============================================================================

/// Collaborators the reducer reads from.
///
/// With a fixed clock and a deterministic id generator, `transition` is a
/// pure function of its inputs.
#[derive(Clone, Copy)]
pub struct ConvContext<'a> {
    pub system_prompt: &'a str,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdGenerator,
}

impl<'a> ConvContext<'a> {
    pub fn new(system_prompt: &'a str, clock: &'a dyn Clock, ids: &'a dyn IdGenerator) -> Self {
        Self {
            system_prompt,
            clock,
            ids,
        }
    }
}
