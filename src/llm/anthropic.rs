//! Anthropic messages protocol.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use super::ProviderConfig;
use super::adapter::{
    ProviderAdapter, content_at, insert_secret_header, json_headers, tokens_at, user_messages,
};
use crate::error::AdapterError;

const PROTOCOL: &str = "anthropic";

/// Pinned API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub(crate) struct AnthropicAdapter;

impl ProviderAdapter for AnthropicAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value {
        json!({
            "model": config.model,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "messages": user_messages(prompt),
        })
    }

    fn build_headers(&self, config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
        let mut headers = json_headers();
        insert_secret_header(
            &mut headers,
            config,
            HeaderName::from_static("x-api-key"),
            config.api_key.expose_secret().to_string(),
        )?;
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        Ok(headers)
    }

    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError> {
        content_at(raw, "/content/0/text", PROTOCOL)
    }

    fn extract_token_usage(&self, raw: &Value) -> u64 {
        tokens_at(raw, "/usage/input_tokens")
            .saturating_add(tokens_at(raw, "/usage/output_tokens"))
    }
}
