//! Ambient conversation context
//!
//! Providers describe the user's surroundings (where they are, what they are
//! looking at). The runtime asks for a fresh snapshot on every LLM request
//! and the prompt builder wraps it in a `<context>` block.

use std::sync::Arc;

/// Snapshot of ambient context for one LLM request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationContext {
    pub messages: Vec<String>,
}

impl ConversationContext {
    pub fn new(messages: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            messages: messages.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Merge another snapshot after this one
    #[must_use]
    pub fn merge(mut self, other: ConversationContext) -> Self {
        self.messages.extend(other.messages);
        self
    }
}

/// Source of context, read once per LLM request
pub trait ContextProvider: Send + Sync {
    fn context(&self) -> ConversationContext;
}

impl<F> ContextProvider for F
where
    F: Fn() -> ConversationContext + Send + Sync,
{
    fn context(&self) -> ConversationContext {
        self()
    }
}

/// Provider that never contributes anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoContext;

impl ContextProvider for NoContext {
    fn context(&self) -> ConversationContext {
        ConversationContext::default()
    }
}

/// Several providers read in order and concatenated
#[derive(Default, Clone)]
pub struct ContextProviders {
    providers: Vec<Arc<dyn ContextProvider>>,
}

impl ContextProviders {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }
}

impl ContextProvider for ContextProviders {
    fn context(&self) -> ConversationContext {
        self.providers
            .iter()
            .fold(ConversationContext::default(), |acc, p| acc.merge(p.context()))
    }
}
