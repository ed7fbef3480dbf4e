//! Supervised LLM and tool tasks
//!
//! Each task gets its own cancellation token keyed by its [`TaskHandle`].
//! A task that has been interrupted never dispatches a completion.

use super::executor::Dispatcher;
use crate::llm::{LlmError, LlmGateway, Prompt, ToolUseRequest};
use crate::state_machine::{Action, TaskHandle};
use crate::tools::{ToolContext, ToolRegistry, ToolResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

pub(crate) struct TaskSupervisor {
    tasks: HashMap<TaskHandle, CancellationToken>,
    tracker: TaskTracker,
    dispatcher: Dispatcher,
}

impl TaskSupervisor {
    pub fn new(tracker: TaskTracker, dispatcher: Dispatcher) -> Self {
        Self {
            tasks: HashMap::new(),
            tracker,
            dispatcher,
        }
    }

    /// Fork one gateway call
    pub fn spawn_llm(&mut self, task: TaskHandle, prompt: Prompt, gateway: Arc<dyn LlmGateway>) {
        let token = self.register(task);
        let dispatcher = self.dispatcher.clone();

        self.tracker.spawn(async move {
            tracing::info!(request = %task, messages = prompt.messages.len(), "Making LLM request");

            let action = tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::info!(request = %task, "LLM request interrupted");
                    return;
                }

                result = gateway.converse(&prompt) => match result {
                    Ok(response) if response.content.is_empty() => Action::LlmError {
                        request: task,
                        error: LlmError::unknown("No content in LLM response"),
                    },
                    Ok(response) => {
                        let (content, tool_uses) = response.partition();
                        Action::LlmResponse { request: task, content, tool_uses }
                    }
                    Err(error) => Action::LlmError { request: task, error },
                },
            };

            if token.is_cancelled() {
                tracing::debug!(request = %task, "Dropping completion of interrupted request");
                return;
            }
            dispatcher.dispatch(action);
        });
    }

    /// Fork one tool execution
    pub fn spawn_tool(&mut self, task: TaskHandle, request: ToolUseRequest, tools: Arc<ToolRegistry>) {
        let token = self.register(task);
        let dispatcher = self.dispatcher.clone();

        self.tracker.spawn(async move {
            let ToolUseRequest {
                tool_use_id,
                name,
                input,
            } = request;
            tracing::info!(tool = %name, tool_use_id = %tool_use_id, "Executing tool");

            let ctx = ToolContext::new(token.clone(), tool_use_id.clone());
            let result = tokio::select! {
                biased;

                () = token.cancelled() => {
                    tracing::info!(tool = %name, tool_use_id = %tool_use_id, "Tool interrupted");
                    return;
                }

                result = tools.execute(&name, input, ctx) => result,
            };

            if token.is_cancelled() {
                tracing::debug!(tool_use_id = %tool_use_id, "Dropping result of interrupted tool");
                return;
            }
            tracing::debug!(
                tool = %name,
                tool_use_id = %tool_use_id,
                is_error = ?result.as_ref().map(ToolResult::is_error),
                "Tool finished"
            );
            dispatcher.dispatch(Action::ToolResult {
                task,
                tool_use_id,
                result,
            });
        });
    }

    /// Interrupt the given tasks without waiting for them
    pub fn interrupt(&mut self, tasks: &[TaskHandle]) {
        for task in tasks {
            if let Some(token) = self.tasks.remove(task) {
                tracing::debug!(task = %task, "Interrupting task");
                token.cancel();
            }
        }
    }

    pub fn interrupt_all(&mut self) {
        for (_, token) in self.tasks.drain() {
            token.cancel();
        }
    }

    /// Forget every task the current state no longer waits on
    pub fn retain(&mut self, live: &[TaskHandle]) {
        self.tasks.retain(|task, token| {
            let keep = live.contains(task);
            if !keep {
                token.cancel();
            }
            keep
        });
    }

    fn register(&mut self, task: TaskHandle) -> CancellationToken {
        let token = CancellationToken::new();
        self.tasks.insert(task, token.clone());
        token
    }
}
