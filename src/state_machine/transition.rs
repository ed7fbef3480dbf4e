//! Pure state transition function
//!
//! Every (state, action) pair is matched explicitly. Pairs that make no
//! sense in the current state are no-ops that hand the state back unchanged.

use super::{Action, ConvContext, ConversationError, Effect, State, TaskHandle, ToolCall};
use crate::event_log::{Event, EventId, EventLog, MessageContent, MessageEvent, ToolUseEvent};
use crate::llm::{ContentBlock, Role, ToolUseRequest};
use crate::prompt::build_prompt;
use crate::tools::ToolResult;
use chrono::{DateTime, Utc};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Whether an action changed anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Ignored(&'static str),
}

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: State,
    pub effects: Vec<Effect>,
    pub outcome: Outcome,
}

impl TransitionResult {
    pub fn applied(state: State) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            outcome: Outcome::Applied,
        }
    }

    pub fn ignored(state: State, reason: &'static str) -> Self {
        Self {
            new_state: state,
            effects: vec![],
            outcome: Outcome::Ignored(reason),
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == Outcome::Applied
    }
}

/// Pure transition function
///
/// Given the same state, action and collaborators, it always produces the
/// same result, with no I/O side effects.
#[allow(clippy::too_many_lines)]
pub fn transition(state: State, ctx: &ConvContext<'_>, action: Action) -> TransitionResult {
    match (state, action) {
        // ============================================================
        // Clear: valid everywhere, interrupts whatever is in flight
        // ============================================================
        (state, Action::Clear) => {
            let tasks = state.outstanding_tasks();
            let result = TransitionResult::applied(State::initial(ctx.clock.now()));
            if tasks.is_empty() {
                result
            } else {
                result.with_effect(Effect::Interrupt { tasks })
            }
        }

        // ============================================================
        // Idle
        // ============================================================
        (
            State::Idle {
                mut events,
                timestamp,
                error,
            },
            Action::Ask { text },
        ) => {
            let now = ctx.clock.now();
            let message = Event::Message(MessageEvent {
                id: EventId::new(ctx.ids.next_id()),
                timestamp: now,
                role: Role::User,
                content: MessageContent::Text { text },
                discarded: false,
            });
            if events.append(message).is_err() {
                return TransitionResult::ignored(
                    State::Idle {
                        events,
                        timestamp,
                        error,
                    },
                    "duplicate event id",
                );
            }
            request_llm(events, ctx, now)
        }

        (
            State::Idle {
                mut events,
                timestamp,
                error,
            },
            Action::Discard { id },
        ) => {
            let found = events.discard(id);
            let state = State::Idle {
                events,
                timestamp,
                error,
            };
            if found {
                TransitionResult::applied(state)
            } else {
                TransitionResult::ignored(state, "unknown event id")
            }
        }

        (
            state @ State::Idle { .. },
            Action::Abort
            | Action::LlmError { .. }
            | Action::LlmResponse { .. }
            | Action::ToolResult { .. },
        ) => TransitionResult::ignored(state, "nothing in flight"),

        // ============================================================
        // WaitingForAssistant
        // ============================================================
        (State::WaitingForAssistant { events, request, .. }, Action::Abort) => {
            TransitionResult::applied(State::Idle {
                events,
                timestamp: ctx.clock.now(),
                error: None,
            })
            .with_effect(Effect::Interrupt {
                tasks: vec![request],
            })
        }

        (
            State::WaitingForAssistant { events, request, .. },
            Action::LlmError {
                request: completed,
                error,
            },
        ) if completed == request => TransitionResult::applied(State::Idle {
            events,
            timestamp: ctx.clock.now(),
            error: Some(ConversationError::llm(&error)),
        }),

        (
            State::WaitingForAssistant {
                events,
                timestamp,
                request,
            },
            Action::LlmResponse {
                request: completed,
                content,
                tool_uses,
            },
        ) if completed == request => {
            handle_llm_response(events, timestamp, request, ctx, &content, tool_uses)
        }

        (
            state @ State::WaitingForAssistant { .. },
            Action::LlmError { .. } | Action::LlmResponse { .. },
        ) => TransitionResult::ignored(state, "stale LLM completion"),

        (state @ State::WaitingForAssistant { .. }, Action::ToolResult { .. }) => {
            TransitionResult::ignored(state, "no tool calls outstanding")
        }

        // ============================================================
        // ToolUse
        // ============================================================
        (State::ToolUse { events, calls, .. }, Action::Abort) => {
            let tasks: Vec<TaskHandle> = calls.values().map(|c| c.task).collect();
            TransitionResult::applied(State::Idle {
                events,
                timestamp: ctx.clock.now(),
                error: None,
            })
            .with_effect(Effect::Interrupt { tasks })
        }

        (
            State::ToolUse {
                events,
                timestamp,
                calls,
            },
            Action::ToolResult {
                task,
                tool_use_id,
                result,
            },
        ) => handle_tool_result(events, timestamp, calls, ctx, task, tool_use_id, result),

        (state @ State::ToolUse { .. }, Action::LlmError { .. } | Action::LlmResponse { .. }) => {
            TransitionResult::ignored(state, "no LLM request outstanding")
        }

        // ============================================================
        // Busy states reject caller input
        // ============================================================
        (
            state @ (State::WaitingForAssistant { .. } | State::ToolUse { .. }),
            Action::Ask { .. },
        ) => TransitionResult::ignored(state, "conversation is busy"),

        (
            state @ (State::WaitingForAssistant { .. } | State::ToolUse { .. }),
            Action::Discard { .. },
        ) => TransitionResult::ignored(state, "discard is only allowed while idle"),
    }
}

/// Fork an LLM request over the current log
fn request_llm(events: EventLog, ctx: &ConvContext<'_>, now: DateTime<Utc>) -> TransitionResult {
    let task = TaskHandle::new(ctx.ids.next_id());
    let prompt = build_prompt(ctx.system_prompt, &events);
    TransitionResult::applied(State::WaitingForAssistant {
        events,
        timestamp: now,
        request: task,
    })
    .with_effect(Effect::RequestLlm { task, prompt })
}

fn handle_llm_response(
    mut events: EventLog,
    timestamp: DateTime<Utc>,
    request: TaskHandle,
    ctx: &ConvContext<'_>,
    content: &[ContentBlock],
    tool_uses: Vec<ToolUseRequest>,
) -> TransitionResult {
    let now = ctx.clock.now();
    let text = content
        .iter()
        .filter_map(ContentBlock::as_text)
        .collect::<Vec<_>>()
        .join("\n\n");

    let message = Event::Message(MessageEvent {
        id: EventId::new(ctx.ids.next_id()),
        timestamp: now,
        role: Role::Assistant,
        content: MessageContent::Text { text },
        discarded: false,
    });
    if events.append(message).is_err() {
        return TransitionResult::ignored(
            State::WaitingForAssistant {
                events,
                timestamp,
                request,
            },
            "duplicate event id",
        );
    }

    if tool_uses.is_empty() {
        return TransitionResult::applied(State::Idle {
            events,
            timestamp: now,
            error: None,
        });
    }

    let mut calls = HashMap::with_capacity(tool_uses.len());
    let mut effects = Vec::with_capacity(tool_uses.len());
    for request in tool_uses {
        // A repeated correlation id would be unresolvable; keep the first
        let Entry::Vacant(slot) = calls.entry(request.tool_use_id.clone()) else {
            continue;
        };
        let task = TaskHandle::new(ctx.ids.next_id());
        slot.insert(ToolCall {
            name: request.name.clone(),
            input: request.input.clone(),
            task,
        });
        effects.push(Effect::ExecuteTool { task, request });
    }

    TransitionResult::applied(State::ToolUse {
        events,
        timestamp: now,
        calls,
    })
    .with_effects(effects)
}

#[allow(clippy::too_many_arguments)]
fn handle_tool_result(
    mut events: EventLog,
    timestamp: DateTime<Utc>,
    mut calls: HashMap<String, ToolCall>,
    ctx: &ConvContext<'_>,
    task: TaskHandle,
    tool_use_id: String,
    result: Option<ToolResult>,
) -> TransitionResult {
    let call = match calls.remove(&tool_use_id) {
        Some(call) if call.task == task => call,
        Some(call) => {
            calls.insert(tool_use_id, call);
            return TransitionResult::ignored(
                State::ToolUse {
                    events,
                    timestamp,
                    calls,
                },
                "stale tool completion",
            );
        }
        None => {
            return TransitionResult::ignored(
                State::ToolUse {
                    events,
                    timestamp,
                    calls,
                },
                "unknown tool use id",
            );
        }
    };

    let now = ctx.clock.now();
    let event = Event::ToolUse(ToolUseEvent {
        id: EventId::new(ctx.ids.next_id()),
        timestamp: now,
        tool_use_id: tool_use_id.clone(),
        name: call.name.clone(),
        input: call.input.clone(),
        result: result.unwrap_or_else(ToolResult::interrupted),
        discarded: false,
    });
    if events.append(event).is_err() {
        calls.insert(tool_use_id, call);
        return TransitionResult::ignored(
            State::ToolUse {
                events,
                timestamp,
                calls,
            },
            "duplicate event id",
        );
    }

    if calls.is_empty() {
        request_llm(events, ctx, now)
    } else {
        TransitionResult::applied(State::ToolUse {
            events,
            timestamp: now,
            calls,
        })
    }
}
