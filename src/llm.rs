//! LLM gateway abstraction
//!
//! The engine talks to a backend through [`LlmGateway::converse`]. Vendor
//! request/response translation lives in the adapters (see [`anthropic`]).

mod anthropic;
mod error;
mod types;

pub use anthropic::AnthropicGateway;
pub use error::{LlmError, LlmErrorKind};
pub use types::*;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Common interface for LLM backends
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Run one completion over the prompt. No retries happen here.
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError>;

    /// Get the model ID attached to every request
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LlmGateway + ?Sized> LlmGateway for Arc<T> {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        (**self).converse(prompt).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for gateways
pub struct LoggingGateway<G> {
    inner: G,
}

impl<G: LlmGateway> LoggingGateway<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<G: LlmGateway> LlmGateway for LoggingGateway<G> {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.converse(prompt).await;
        let duration = start.elapsed();

        match &result {
            Ok(response) => {
                tracing::info!(
                    model = %self.inner.model_id(),
                    duration_ms = %duration.as_millis(),
                    messages = prompt.messages.len(),
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM request completed"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.inner.model_id(),
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    "LLM request failed"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

/// One serialized gateway round trip, handed to a [`Recorder`]
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub model: String,
    pub request: Value,
    pub response: Value,
}

/// Side channel for debugging gateway traffic. Must not block.
pub trait Recorder: Send + Sync {
    fn record(&self, exchange: Exchange);
}

impl<F> Recorder for F
where
    F: Fn(Exchange) + Send + Sync,
{
    fn record(&self, exchange: Exchange) {
        self(exchange);
    }
}

/// Gateway wrapper that reports every request/response pair to a recorder.
///
/// The recorder sees the outcome after the fact and cannot alter it.
pub struct RecordingGateway<G> {
    inner: G,
    recorder: Arc<dyn Recorder>,
}

impl<G: LlmGateway> RecordingGateway<G> {
    pub fn new(inner: G, recorder: Arc<dyn Recorder>) -> Self {
        Self { inner, recorder }
    }
}

#[async_trait]
impl<G: LlmGateway> LlmGateway for RecordingGateway<G> {
    async fn converse(&self, prompt: &Prompt) -> Result<LlmResponse, LlmError> {
        let result = self.inner.converse(prompt).await;

        let response = match &result {
            Ok(response) => serde_json::to_value(response).unwrap_or(Value::Null),
            Err(e) => serde_json::json!({
                "error": { "kind": e.kind, "message": e.message }
            }),
        };
        self.recorder.record(Exchange {
            model: self.inner.model_id().to_string(),
            request: serde_json::to_value(prompt).unwrap_or(Value::Null),
            response,
        });

        result
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}
