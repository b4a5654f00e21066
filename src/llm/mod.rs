//! Provider layer for the email ensemble.
//!
//! Supports eight provider families across five wire protocols:
//! - **OpenAI-compatible**: OpenAI, Groq, Mistral, Together
//! - **Anthropic**: messages API
//! - **Google**: Gemini `generateContent`
//! - **Qwen**: DashScope text generation
//! - **Cohere**: chat API
//!
//! Adapters are pure translation. All I/O happens in the dispatcher.

pub mod adapter;
mod anthropic;
mod cohere;
pub mod costs;
mod gemini;
mod openai_compat;
mod qwen;

pub use adapter::{ProviderAdapter, adapter_for};
pub use costs::CostTable;

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default priority weight for a provider with none configured.
pub const DEFAULT_PRIORITY_WEIGHT: f64 = 1.0;

/// Default completion token limit.
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Supported provider families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderFamily {
    OpenAi,
    Anthropic,
    Google,
    Qwen,
    Groq,
    Cohere,
    Mistral,
    Together,
}

impl ProviderFamily {
    /// Every supported family, in catalog order.
    pub const ALL: [ProviderFamily; 8] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::Google,
        Self::Qwen,
        Self::Groq,
        Self::Cohere,
        Self::Mistral,
        Self::Together,
    ];

    /// Stable identifier used in storage and config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Qwen => "qwen",
            Self::Groq => "groq",
            Self::Cohere => "cohere",
            Self::Mistral => "mistral",
            Self::Together => "together",
        }
    }

    /// Human-readable vendor name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
            Self::Qwen => "Qwen",
            Self::Groq => "Groq",
            Self::Cohere => "Cohere",
            Self::Mistral => "Mistral",
            Self::Together => "Together AI",
        }
    }

    /// Public API endpoint used when a provider has no override.
    ///
    /// Google's endpoint is a template: `{model}` is substituted at dispatch.
    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1/chat/completions",
            Self::Anthropic => "https://api.anthropic.com/v1/messages",
            Self::Google => {
                "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
            }
            Self::Qwen => {
                "https://dashscope.aliyuncs.com/api/v1/services/aigc/text-generation/generation"
            }
            Self::Groq => "https://api.groq.com/openai/v1/chat/completions",
            Self::Cohere => "https://api.cohere.ai/v1/chat",
            Self::Mistral => "https://api.mistral.ai/v1/chat/completions",
            Self::Together => "https://api.together.xyz/v1/chat/completions",
        }
    }

    /// Model identifiers known to work with this family.
    pub fn known_models(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo"],
            Self::Anthropic => &[
                "claude-3-5-sonnet-20241022",
                "claude-3-haiku-20240307",
                "claude-3-opus-20240229",
            ],
            Self::Google => &["gemini-pro", "gemini-pro-vision", "gemini-flash"],
            Self::Qwen => &["qwen2.5-max", "qwen2-72b", "qvq-72b"],
            Self::Groq => &["llama-3.1-70b-versatile", "mixtral-8x7b-32768", "gemma-7b-it"],
            Self::Cohere => &["command-r-plus", "command-r", "command-light"],
            Self::Mistral => &[
                "mistral-large-latest",
                "mistral-medium-latest",
                "mistral-small-latest",
            ],
            Self::Together => &[
                "meta-llama/Llama-2-70b-chat-hf",
                "mistralai/Mixtral-8x7B-Instruct-v0.1",
                "togethercomputer/RedPajama-INCITE-7B-Chat",
            ],
        }
    }
}

impl fmt::Display for ProviderFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderFamily {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == needle)
            .ok_or_else(|| ConfigError::UnknownFamily(s.to_string()))
    }
}

/// One configured AI backend.
///
/// The credential is a [`SecretString`]: its `Debug` output is redacted and
/// it is only exposed inside adapter header/endpoint construction.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Store row id (0 for providers that did not come from a store).
    #[serde(default)]
    pub id: i64,
    pub family: ProviderFamily,
    pub model: String,
    pub api_key: SecretString,
    /// Replaces the family's default endpoint.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Voting weight; also orders providers in the registry.
    #[serde(default = "default_priority_weight")]
    pub priority_weight: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority_weight() -> f64 {
    DEFAULT_PRIORITY_WEIGHT
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Create an enabled provider with default weight and limits.
    pub fn new(
        family: ProviderFamily,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            id: 0,
            family,
            model: model.into(),
            api_key: SecretString::from(api_key.into()),
            endpoint: None,
            priority_weight: DEFAULT_PRIORITY_WEIGHT,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            enabled: true,
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.id = id;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.priority_weight = weight;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Label for logs: `family/model`. Never includes the credential.
    pub fn label(&self) -> String {
        format!("{}/{}", self.family, self.model)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: format!("{}.{}", self.label(), key),
            message,
        };

        if self.model.trim().is_empty() {
            return Err(invalid("model", "must not be empty".into()));
        }
        if !self.priority_weight.is_finite() || self.priority_weight <= 0.0 {
            return Err(invalid(
                "priority_weight",
                format!("must be a positive number, got {}", self.priority_weight),
            ));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens", "must be positive".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid(
                "temperature",
                format!("must be within 0.0-2.0, got {}", self.temperature),
            ));
        }
        if let Some(ref endpoint) = self.endpoint
            && reqwest::Url::parse(&endpoint.replace("{model}", "model")).is_err()
        {
            return Err(invalid("endpoint", "not a valid URL".into()));
        }
        Ok(())
    }
}
