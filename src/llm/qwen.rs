//! Alibaba DashScope (Qwen) text-generation protocol.

use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use super::ProviderConfig;
use super::adapter::{ProviderAdapter, bearer_headers, content_at, tokens_at, user_messages};
use crate::error::AdapterError;

const PROTOCOL: &str = "qwen";

pub(crate) struct QwenAdapter;

impl ProviderAdapter for QwenAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value {
        json!({
            "model": config.model,
            "input": { "messages": user_messages(prompt) },
            "parameters": {
                "max_tokens": config.max_tokens,
                "temperature": config.temperature,
            },
        })
    }

    fn build_headers(&self, config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
        bearer_headers(config)
    }

    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError> {
        content_at(raw, "/output/text", PROTOCOL)
    }

    fn extract_token_usage(&self, raw: &Value) -> u64 {
        tokens_at(raw, "/usage/total_tokens")
    }
}
