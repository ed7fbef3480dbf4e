//! Engine configuration loaded from the environment

use crate::prompt::DEFAULT_SYSTEM_PROMPT;
use thiserror::Error;

/// Default model when `CONVO_MODEL` is unset
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default response token cap
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Configuration for the LLM backend
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    /// Proxy base URL; when set the proxy handles authentication
    pub gateway: Option<String>,
    pub model: String,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            gateway: None,
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Configuration for one conversation engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub llm: LlmConfig,
    pub system_prompt: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup (the environment in production)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_tokens = match lookup("CONVO_MAX_TOKENS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidValue {
                    name: "CONVO_MAX_TOKENS",
                    value: raw,
                })?,
            None => DEFAULT_MAX_TOKENS,
        };

        Ok(Self {
            llm: LlmConfig {
                api_key: lookup("ANTHROPIC_API_KEY").filter(|k| !k.is_empty()),
                gateway: lookup("LLM_GATEWAY").filter(|g| !g.is_empty()),
                model: lookup("CONVO_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_tokens,
            },
            system_prompt: lookup("CONVO_SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }
}
