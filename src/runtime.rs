//! Runtime for executing a conversation
//!
//! A single actor task owns the state and applies one transition at a time.
//! LLM and tool calls run as supervised tasks that report back through the
//! actor's mailbox.

mod executor;
mod supervisor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Conversation, ConversationBuilder, Dispatcher};
pub use traits::*;
