//! Cohere chat protocol.

use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use super::ProviderConfig;
use super::adapter::{ProviderAdapter, bearer_headers, content_at, tokens_at};
use crate::error::AdapterError;

const PROTOCOL: &str = "cohere";

pub(crate) struct CohereAdapter;

impl ProviderAdapter for CohereAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value {
        json!({
            "model": config.model,
            "message": prompt,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }

    fn build_headers(&self, config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
        bearer_headers(config)
    }

    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError> {
        content_at(raw, "/text", PROTOCOL)
    }

    fn extract_token_usage(&self, raw: &Value) -> u64 {
        tokens_at(raw, "/meta/tokens/input_tokens")
            .saturating_add(tokens_at(raw, "/meta/tokens/output_tokens"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderFamily;

    #[test]
    fn request_uses_single_message_field() {
        let config = ProviderConfig::new(ProviderFamily::Cohere, "command-r", "k");
        let body = CohereAdapter.build_request(&config, "p");
        assert_eq!(body["message"], "p");
        assert!(body.get("messages").is_none());
    }

    #[test]
    fn usage_is_best_effort() {
        let raw = json!({"text": "t", "meta": {"tokens": {"input_tokens": 10, "output_tokens": 5}}});
        assert_eq!(CohereAdapter.extract_content(&raw).unwrap(), "t");
        assert_eq!(CohereAdapter.extract_token_usage(&raw), 15);
        assert_eq!(CohereAdapter.extract_token_usage(&json!({"text": "t"})), 0);
    }

    #[test]
    fn oversized_usage_saturates() {
        let raw = json!({"meta": {"tokens": {"input_tokens": 3, "output_tokens": u64::MAX}}});
        assert_eq!(CohereAdapter.extract_token_usage(&raw), u64::MAX);
    }
}
