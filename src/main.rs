//! convo - terminal front end for the conversation engine
//!
//! Reads lines from stdin. Plain text asks the assistant; lines starting
//! with `/` are commands (`/abort`, `/clear`, `/discard <id>`, `/log`,
//! `/quit`).

use convo_engine::event_log::{Event, EventId, MessageContent};
use convo_engine::llm::{AnthropicGateway, LoggingGateway, Role};
use convo_engine::tools::{FnTool, ThinkTool, ToolRegistry, ToolResult};
use convo_engine::{
    Action, Conversation, ConversationContext, ConversationError, EngineConfig, State,
};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, PartialEq)]
enum Input {
    Ask(String),
    Abort,
    Clear,
    Discard(EventId),
    Log,
    Quit,
    Empty,
    Invalid(String),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Ask(line.to_string());
    };

    let (name, arg) = command
        .split_once(char::is_whitespace)
        .map_or((command, ""), |(n, a)| (n, a.trim()));
    match name {
        "abort" => Input::Abort,
        "clear" => Input::Clear,
        "log" => Input::Log,
        "quit" | "exit" => Input::Quit,
        "discard" => match arg.parse() {
            Ok(id) => Input::Discard(id),
            Err(_) => Input::Invalid(format!("not an event id: {arg:?}")),
        },
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

fn tools() -> ToolRegistry {
    ToolRegistry::new().with_tool(ThinkTool).with_tool(
        FnTool::new(
            "current_time",
            json!({ "type": "object", "properties": {}, "additionalProperties": false }),
            |_input, _ctx| async { Some(ToolResult::success_text(chrono::Utc::now().to_rfc3339())) },
        )
        .with_description("Current date and time in UTC (RFC 3339)"),
    )
}

/// Where the user is running from, re-read for every request
fn workspace_context() -> ConversationContext {
    match std::env::current_dir() {
        Ok(dir) => ConversationContext::new([format!("working directory: {}", dir.display())]),
        Err(_) => ConversationContext::default(),
    }
}

fn format_error(error: &ConversationError) -> String {
    if error.kind.is_transient() {
        format!("error: {error} (temporary, ask again to retry)")
    } else {
        format!("error: {error}")
    }
}

fn describe(event: &Event) -> String {
    match event {
        Event::Message(m) => {
            let who = match m.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            let body = match &m.content {
                MessageContent::Text { text } => text.clone(),
                MessageContent::Image { .. } => "[image]".to_string(),
                MessageContent::Document { name, .. } => format!("[document {name}]"),
            };
            format!("{who}> {body}")
        }
        Event::ToolUse(t) => {
            let status = if t.result.is_error() { "error" } else { "ok" };
            format!("[{} {}] {}", t.name, status, t.result.text())
        }
    }
}

fn print_log(state: &State) {
    for event in state.events() {
        let mark = if event.is_discarded() { " (discarded)" } else { "" };
        println!("{} {}{mark}", event.id(), describe(event));
    }
}

/// Print events the user has not seen yet, plus any new error
fn render(state: &State, seen: &mut HashSet<EventId>, last_error: &mut Option<String>) {
    if state.events().is_empty() {
        seen.clear();
    }
    for event in state.events() {
        if seen.insert(event.id()) {
            if let Event::Message(m) = event {
                if m.role == Role::User {
                    continue;
                }
            }
            println!("{}", describe(event));
        }
    }

    let error = state.error().map(format_error);
    if error != *last_error {
        if let Some(error) = &error {
            println!("{error}");
        }
        *last_error = error;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "convo_engine=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = EngineConfig::from_env()?;
    let gateway = AnthropicGateway::new(&config.llm)?;
    tracing::info!(model = %config.llm.model, "LLM gateway configured");

    let convo = Conversation::builder(Arc::new(LoggingGateway::new(gateway)))
        .tools(tools())
        .system_prompt(config.system_prompt)
        .context(Arc::new(workspace_context))
        .start();
    let mut updates = convo.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut seen = HashSet::new();
    let mut last_error = None;

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                render(&state, &mut seen, &mut last_error);
            }

            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_line(&line) {
                    Input::Ask(text) => {
                        if !convo.state().is_idle() {
                            println!("(busy; /abort to cancel the current turn)");
                        }
                        convo.dispatch(Action::Ask { text });
                    }
                    Input::Abort => convo.dispatch(Action::Abort),
                    Input::Clear => convo.dispatch(Action::Clear),
                    Input::Discard(id) => convo.dispatch(Action::Discard { id }),
                    Input::Log => print_log(&convo.state()),
                    Input::Quit => break,
                    Input::Empty => {}
                    Input::Invalid(message) => println!("{message}"),
                }
            }
        }
    }

    convo.shutdown().await;
    Ok(())
}
