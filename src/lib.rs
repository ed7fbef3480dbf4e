//! Conversation orchestration engine
//!
//! Drives a chat session between a user and a tool-using LLM assistant: a
//! pure state machine decides what is in flight, a single actor applies
//! transitions, and supervised tasks run LLM and tool calls concurrently.

pub mod config;
pub mod context;
pub mod event_log;
pub mod llm;
pub mod prompt;
pub mod runtime;
pub mod state_machine;
pub mod tools;

pub use config::{ConfigError, EngineConfig, LlmConfig};
pub use context::{ContextProvider, ConversationContext};
pub use event_log::{Event, EventId, EventLog};
pub use runtime::{Conversation, Dispatcher};
pub use state_machine::{Action, ConversationError, State};
