//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use super::traits::{Clock, IdGenerator};
use crate::llm::{ContentBlock, LlmError, LlmGateway, LlmResponse, Prompt, Usage};
use crate::tools::{Tool, ToolContext, ToolResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

// ============================================================================
// Mock Gateway
// ============================================================================

/// Gateway that returns queued responses in order
pub struct MockGateway {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    /// Record of all prompts received
    pub prompts: Mutex<Vec<Prompt>>,
}

impl MockGateway {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response
    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(response(vec![ContentBlock::text(text)]));
    }

    /// Queue an error response
    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded prompts
    pub fn recorded_prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }
}

#[async_trait]
impl LlmGateway for MockGateway {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        self.next(prompt)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

pub fn response(content: Vec<ContentBlock>) -> LlmResponse {
    LlmResponse {
        content,
        end_turn: true,
        usage: Usage::default(),
    }
}

// ============================================================================
// Delayed Mock Gateway (for cancellation testing)
// ============================================================================

/// Mock gateway with configurable delay
pub struct DelayedMockGateway {
    inner: MockGateway,
    delay: Duration,
    /// Number of requests that have started
    pub started: AtomicUsize,
    /// Notified when a request starts
    pub request_started: Arc<Notify>,
}

impl DelayedMockGateway {
    pub fn new(model_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            inner: MockGateway::new(model_id),
            delay,
            started: AtomicUsize::new(0),
            request_started: Arc::new(Notify::new()),
        }
    }

    pub fn queue_text(&self, text: &str) {
        self.inner.queue_text(text);
    }

    pub fn recorded_prompts(&self) -> Vec<Prompt> {
        self.inner.recorded_prompts()
    }
}

#[async_trait]
impl LlmGateway for DelayedMockGateway {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        let result = self.inner.next(prompt);
        self.started.fetch_add(1, Ordering::SeqCst);
        self.request_started.notify_one();
        tokio::time::sleep(self.delay).await;
        result
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

// ============================================================================
// Pending Tool (for interruption testing)
// ============================================================================

/// Tool that never finishes on its own
pub struct PendingTool {
    name: String,
    /// Number of invocations that have started
    pub started: Arc<AtomicUsize>,
    pub execution_started: Arc<Notify>,
}

impl PendingTool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            started: Arc::new(AtomicUsize::new(0)),
            execution_started: Arc::new(Notify::new()),
        }
    }
}

#[async_trait]
impl Tool for PendingTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<String> {
        None
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn run(&self, _input: Value, ctx: ToolContext) -> Option<ToolResult> {
        self.started.fetch_add(1, Ordering::SeqCst);
        self.execution_started.notify_one();
        ctx.cancel.cancelled().await;
        None
    }
}

// ============================================================================
// Deterministic clock and ids
// ============================================================================

/// Ids 1, 2, 3, ... as UUIDs
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIds {
    fn next_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Integration tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ConversationContext;
    use crate::event_log::Event;
    use crate::llm::ToolUseRequest;
    use crate::runtime::Conversation;
    use crate::state_machine::{Action, State, TaskHandle};
    use crate::tools::{FnTool, ToolRegistry};
    use tokio::sync::watch;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn start(gateway: Arc<dyn LlmGateway>, tools: ToolRegistry) -> Conversation {
        Conversation::builder(gateway)
            .tools(tools)
            .system_prompt("sys")
            .clock(Arc::new(FixedClock::default()))
            .ids(Arc::new(SequentialIds::new()))
            .start()
    }

    async fn wait_for(rx: &mut watch::Receiver<State>, pred: impl FnMut(&State) -> bool) -> State {
        tokio::time::timeout(TIMEOUT, rx.wait_for(pred))
            .await
            .expect("timed out waiting for state")
            .expect("conversation stopped")
            .clone()
    }

    fn message_texts(state: &State) -> Vec<String> {
        state
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Message(m) => m.content.as_text().map(str::to_string),
                Event::ToolUse(_) => None,
            })
            .collect()
    }

    fn tool_use_response(ids: &[(&str, &str)]) -> LlmResponse {
        response(
            ids.iter()
                .map(|(id, name)| ContentBlock::tool_use(*id, *name, json!({})))
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_mock_gateway_queue() {
        let gateway = MockGateway::new("test-model");
        gateway.queue_text("one");
        let prompt = Prompt {
            system: "s".to_string(),
            messages: vec![],
            tool_config: None,
        };
        assert_eq!(gateway.converse(&prompt).await.unwrap().text(), "one");
        let err = gateway.converse(&prompt).await.unwrap_err();
        assert_eq!(err.message, "No mock response queued");
        assert_eq!(gateway.recorded_prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_simple_text_response() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_text("Hi! How can I help?");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("hi"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 2).await;

        assert!(state.error().is_none());
        assert_eq!(message_texts(&state), vec!["hi", "Hi! How can I help?"]);
        let prompts = gateway.recorded_prompts();
        assert_eq!(prompts.len(), 1);
        assert_eq!(prompts[0].system, "sys");
        assert_eq!(
            prompts[0].messages,
            vec![crate::llm::PromptMessage::user(ContentBlock::text("hi"))]
        );
        assert!(prompts[0].tool_config.is_none());
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_unregistered_tool_reports_not_found() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_response(tool_use_response(&[("tu-1", "get_weather")]));
        gateway.queue_text("Sorry, I can't check the weather.");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("weather?"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 4).await;

        let tool_event = state
            .events()
            .iter()
            .find_map(|e| match e {
                Event::ToolUse(t) => Some(t.clone()),
                Event::Message(_) => None,
            })
            .unwrap();
        assert_eq!(tool_event.tool_use_id, "tu-1");
        assert_eq!(tool_event.result, ToolResult::error_text("Tool \"get_weather\" not found"));

        let prompts = gateway.recorded_prompts();
        assert_eq!(prompts.len(), 2);
        let last = prompts[1].messages.last().unwrap();
        assert!(matches!(
            &last.content[0],
            ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "tu-1"
        ));
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_tool_execution_cycle_with_registry() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_response(tool_use_response(&[("tu-1", "echo"), ("tu-2", "echo")]));
        gateway.queue_text("done");
        let tools = ToolRegistry::new().with_tool(FnTool::new(
            "echo",
            json!({ "type": "object" }),
            |_input, ctx| async move { Some(ToolResult::success_text(ctx.tool_use_id)) },
        ));
        let convo = start(gateway.clone(), tools);
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("go"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 5).await;

        let mut results: Vec<String> = state
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::ToolUse(t) => Some(t.result.text()),
                Event::Message(_) => None,
            })
            .collect();
        results.sort();
        assert_eq!(results, vec!["tu-1", "tu-2"]);

        let prompts = gateway.recorded_prompts();
        let config = prompts[0].tool_config.as_ref().unwrap();
        assert_eq!(config.tools[0].name, "echo");
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_llm_error_handling() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_error(LlmError::auth("invalid api key"));
        let convo = start(gateway, ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("hi"));
        let state = wait_for(&mut rx, |s| s.error().is_some()).await;

        let error = state.error().unwrap();
        assert_eq!(error.message, "Error while calling LLM");
        assert_eq!(error.details.as_deref(), Some("invalid api key"));
        assert_eq!(state.events().len(), 1);
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_response_is_error() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_response(response(vec![]));
        let convo = start(gateway, ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("hi"));
        let state = wait_for(&mut rx, |s| s.error().is_some()).await;
        assert_eq!(
            state.error().unwrap().details.as_deref(),
            Some("No content in LLM response")
        );
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_during_tool_execution() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_response(tool_use_response(&[("tu-1", "wait"), ("tu-2", "wait")]));
        let tool = PendingTool::new("wait");
        let started = tool.started.clone();
        let convo = start(gateway.clone(), ToolRegistry::new().with_tool(tool));
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("go"));
        let busy = wait_for(&mut rx, |s| matches!(s, State::ToolUse { .. })).await;
        assert_eq!(busy.outstanding_tasks().len(), 2);

        convo.dispatch(Action::Abort);
        let state = wait_for(&mut rx, State::is_idle).await;

        assert!(state.error().is_none());
        assert_eq!(state.events(), busy.events());
        assert!(started.load(Ordering::SeqCst) <= 2);

        // Nothing else arrives: no further LLM calls
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gateway.recorded_prompts().len(), 1);
        assert_eq!(convo.state(), state);
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_abort_during_llm_request_then_ask_again() {
        let gateway = Arc::new(DelayedMockGateway::new("test-model", Duration::from_millis(100)));
        gateway.queue_text("first (should be dropped)");
        gateway.queue_text("second");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("one"));
        gateway.request_started.notified().await;
        convo.dispatch(Action::Abort);
        wait_for(&mut rx, State::is_idle).await;

        convo.dispatch(Action::ask("two"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 3).await;
        assert_eq!(message_texts(&state), vec!["one", "two", "second"]);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(convo.state().events().len(), 3);
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_completion_is_ignored() {
        let gateway = Arc::new(DelayedMockGateway::new("test-model", Duration::from_millis(50)));
        gateway.queue_text("real");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("hi"));
        gateway.request_started.notified().await;
        convo.dispatch(Action::LlmResponse {
            request: TaskHandle::new(Uuid::from_u128(777)),
            content: vec![ContentBlock::text("forged")],
            tool_uses: vec![],
        });
        convo.dispatch(Action::ToolResult {
            task: TaskHandle::new(Uuid::from_u128(778)),
            tool_use_id: "nope".to_string(),
            result: None,
        });

        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 2).await;
        assert_eq!(message_texts(&state), vec!["hi", "real"]);
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_clear_while_busy() {
        let gateway = Arc::new(DelayedMockGateway::new("test-model", Duration::from_millis(100)));
        gateway.queue_text("never seen");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("hi"));
        gateway.request_started.notified().await;
        convo.dispatch(Action::Clear);
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().is_empty()).await;
        assert!(state.error().is_none());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(convo.state().events().is_empty());
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_discard_excludes_from_next_prompt() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_text("first answer");
        gateway.queue_text("second answer");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("secret"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 2).await;
        let first_id = state.events().events()[0].id();

        convo.dispatch(Action::Discard { id: first_id });
        wait_for(&mut rx, |s| {
            s.events().get(first_id).is_some_and(Event::is_discarded)
        })
        .await;

        convo.dispatch(Action::ask("again"));
        wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 4).await;

        let prompts = gateway.recorded_prompts();
        let texts: Vec<_> = prompts[1]
            .messages
            .iter()
            .filter_map(|m| m.content[0].as_text())
            .collect();
        assert_eq!(texts, vec!["first answer", "again"]);
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_context_read_for_every_request() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_text("first answer");
        gateway.queue_text("second answer");
        let requests = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&requests);
        let provider = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            ConversationContext::new([format!("request {n}")])
        };
        let convo = Conversation::builder(gateway.clone())
            .system_prompt("sys")
            .clock(Arc::new(FixedClock::default()))
            .ids(Arc::new(SequentialIds::new()))
            .context(Arc::new(provider))
            .start();
        let mut rx = convo.subscribe();

        convo.dispatch(Action::ask("one"));
        wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 2).await;
        convo.dispatch(Action::ask("two"));
        wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 4).await;

        let prompts = gateway.recorded_prompts();
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(
            prompts[0].messages[0].content,
            vec![
                ContentBlock::text("<context>\nrequest 1\n</context>"),
                ContentBlock::text("one"),
            ]
        );
        assert_eq!(
            prompts[1].messages[0].content[0],
            ContentBlock::text("<context>\nrequest 2\n</context>")
        );
        // Context is never written to the log
        assert_eq!(
            message_texts(&convo.state()),
            vec!["one", "first answer", "two", "second answer"]
        );
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_set_tools_swaps_registry() {
        let gateway = Arc::new(MockGateway::new("test-model"));
        gateway.queue_response(tool_use_response(&[("tu-1", "ping")]));
        gateway.queue_text("pong received");
        let convo = start(gateway.clone(), ToolRegistry::new());
        let mut rx = convo.subscribe();

        convo.set_tools(ToolRegistry::new().with_tool(FnTool::new(
            "ping",
            json!({ "type": "object" }),
            |_input, _ctx| async { Some(ToolResult::success_text("pong")) },
        )));
        convo.dispatch(Action::ask("ping it"));
        let state = wait_for(&mut rx, |s| s.is_idle() && s.events().len() == 4).await;

        let result = state
            .events()
            .iter()
            .find_map(|e| match e {
                Event::ToolUse(t) => Some(t.result.clone()),
                Event::Message(_) => None,
            })
            .unwrap();
        assert_eq!(result, ToolResult::success_text("pong"));
        convo.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_delivers_no_further_completions() {
        let gateway = Arc::new(DelayedMockGateway::new("test-model", Duration::from_secs(30)));
        gateway.queue_text("too late");
        let convo = start(gateway.clone(), ToolRegistry::new());

        convo.dispatch(Action::ask("hi"));
        gateway.request_started.notified().await;

        tokio::time::timeout(TIMEOUT, convo.shutdown())
            .await
            .expect("shutdown should not wait for the interrupted request");
        assert!(!convo.is_running());

        let state = convo.state();
        assert!(matches!(state, State::WaitingForAssistant { .. }));

        convo.dispatch(Action::Abort);
        convo.dispatch(Action::LlmResponse {
            request: state.outstanding_tasks()[0],
            content: vec![ContentBlock::text("after teardown")],
            tool_uses: vec![ToolUseRequest {
                tool_use_id: "x".to_string(),
                name: "y".to_string(),
                input: json!({}),
            }],
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(convo.state(), state);
    }

    #[test]
    fn test_sequential_ids_and_fixed_clock() {
        let ids = SequentialIds::new();
        assert_eq!(ids.next_id(), Uuid::from_u128(1));
        assert_eq!(ids.next_id(), Uuid::from_u128(2));

        let clock = FixedClock::default();
        let t0 = clock.now();
        clock.advance(ChronoDuration::seconds(5));
        assert_eq!(clock.now() - t0, ChronoDuration::seconds(5));
    }
}
