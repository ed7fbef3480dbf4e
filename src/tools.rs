//! Tool registry and validated execution
//!
//! Tools are looked up by name, their input is checked against the declared
//! schema, and every failure along the way is folded into an error
//! [`ToolResult`] instead of failing the calling task.

mod think;

pub use think::ThinkTool;

use crate::llm::{ImageSource, ToolConfig, ToolDefinition};
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use jsonschema::Validator;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Outcome status of a tool invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Content block inside a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolResultContent {
    Text { text: String },
    Json { value: Value },
    Image { source: ImageSource },
}

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,
    pub content: Vec<ToolResultContent>,
}

impl ToolResult {
    pub fn success_text(text: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Success,
            content: vec![ToolResultContent::Text { text: text.into() }],
        }
    }

    pub fn error_text(text: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            content: vec![ToolResultContent::Text { text: text.into() }],
        }
    }

    /// Result recorded for a call whose executor produced nothing
    pub fn interrupted() -> Self {
        Self::error_text("Tool execution interrupted")
    }

    pub fn is_error(&self) -> bool {
        self.status == ToolStatus::Error
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ToolResultContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-call context handed to a tool.
///
/// Tools that do long-running work should watch `cancel` and return early
/// (typically with `None`) once it fires.
#[derive(Clone)]
pub struct ToolContext {
    pub cancel: CancellationToken,
    pub tool_use_id: String,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken, tool_use_id: impl Into<String>) -> Self {
        Self {
            cancel,
            tool_use_id: tool_use_id.into(),
        }
    }
}

/// Trait for tools that can be invoked by the assistant
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> Option<String>;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Run the tool on already-validated input.
    ///
    /// `None` means the tool was interrupted or declined to answer.
    async fn run(&self, input: Value, ctx: ToolContext) -> Option<ToolResult>;
}

type ToolFn = dyn Fn(Value, ToolContext) -> BoxFuture<'static, Option<ToolResult>> + Send + Sync;

/// A tool assembled from a name, schema and async closure.
///
/// Used for tools discovered at runtime, where no dedicated type exists.
pub struct FnTool {
    name: String,
    description: Option<String>,
    input_schema: Value,
    executor: Box<ToolFn>,
}

impl FnTool {
    pub fn new<F, Fut>(name: impl Into<String>, input_schema: Value, executor: F) -> Self
    where
        F: Fn(Value, ToolContext) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Option<ToolResult>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: None,
            input_schema,
            executor: Box::new(move |input, ctx| executor(input, ctx).boxed()),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<String> {
        self.description.clone()
    }

    fn input_schema(&self) -> Value {
        self.input_schema.clone()
    }

    async fn run(&self, input: Value, ctx: ToolContext) -> Option<ToolResult> {
        (self.executor)(input, ctx).await
    }
}

/// A registered tool with its input validator compiled up front
#[derive(Clone)]
struct Entry {
    tool: Arc<dyn Tool>,
    /// `Err` holds the compile error when the declared schema is itself invalid
    validator: Result<Arc<Validator>, String>,
}

impl Entry {
    fn new(tool: Arc<dyn Tool>) -> Self {
        let validator = jsonschema::validator_for(&tool.input_schema())
            .map(Arc::new)
            .map_err(|e| e.to_string());
        if let Err(e) = &validator {
            tracing::warn!(tool = tool.name(), error = %e, "Tool declares an invalid input schema");
        }
        Self { tool, validator }
    }

    /// All violations of the input schema, as `path: message` lines
    fn check(&self, input: &Value) -> Result<(), String> {
        let validator = match &self.validator {
            Ok(v) => v,
            Err(e) => return Err(format!("schema does not compile: {e}")),
        };
        let errors: Vec<String> = validator
            .iter_errors(input)
            .map(|e| {
                let path = e.instance_path.to_string();
                let path = if path.is_empty() { "/".to_string() } else { path };
                format!("{path}: {e}")
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("; "))
        }
    }
}

/// Collection of tools available to a conversation.
///
/// Read-only once handed to the engine; replace it wholesale to change the
/// tool set.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Entry>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool, replacing any previous tool with the same name
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Add a tool and compile its input schema
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), Entry::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| &entry.tool)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Get all tool definitions for LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|entry| &entry.tool)
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Tool configuration for a prompt, `None` when no tools are registered
    pub fn tool_config(&self) -> Option<ToolConfig> {
        if self.is_empty() {
            None
        } else {
            Some(ToolConfig {
                tools: self.definitions(),
            })
        }
    }

    /// Look up, validate and run a tool.
    ///
    /// Lookup and validation failures come back as error results; only the
    /// executor itself can produce `None`.
    pub async fn execute(&self, name: &str, input: Value, ctx: ToolContext) -> Option<ToolResult> {
        let Some(entry) = self.tools.get(name) else {
            return Some(ToolResult::error_text(format!("Tool \"{name}\" not found")));
        };

        if let Err(e) = entry.check(&input) {
            return Some(ToolResult::error_text(format!(
                "Invalid input for tool \"{name}\": {e}"
            )));
        }

        entry.tool.run(input, ctx).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("tools", &names).finish()
    }
}
