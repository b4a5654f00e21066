//! OpenAI chat-completions protocol, shared by OpenAI, Groq, Mistral and Together.

use reqwest::header::HeaderMap;
use serde_json::{Value, json};

use super::ProviderConfig;
use super::adapter::{ProviderAdapter, bearer_headers, content_at, tokens_at, user_messages};
use crate::error::AdapterError;

const PROTOCOL: &str = "openai-compatible";

pub(crate) struct OpenAiCompatibleAdapter;

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value {
        json!({
            "model": config.model,
            "messages": user_messages(prompt),
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
        })
    }

    fn build_headers(&self, config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
        bearer_headers(config)
    }

    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError> {
        content_at(raw, "/choices/0/message/content", PROTOCOL)
    }

    fn extract_token_usage(&self, raw: &Value) -> u64 {
        tokens_at(raw, "/usage/total_tokens")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderFamily;

    #[test]
    fn request_carries_limits_and_single_user_message() {
        let config = ProviderConfig::new(ProviderFamily::Together, "meta-llama/Llama-2-70b-chat-hf", "k")
            .with_max_tokens(256)
            .with_temperature(0.2);
        let body = OpenAiCompatibleAdapter.build_request(&config, "hello");
        assert_eq!(body["model"], "meta-llama/Llama-2-70b-chat-hf");
        assert_eq!(body["max_tokens"], 256);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "hello");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn extracts_choice_content_and_usage() {
        let raw = json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"category\":\"work\"}"}}],
            "usage": {"prompt_tokens": 90, "completion_tokens": 30, "total_tokens": 120}
        });
        assert_eq!(
            OpenAiCompatibleAdapter.extract_content(&raw).unwrap(),
            "{\"category\":\"work\"}"
        );
        assert_eq!(OpenAiCompatibleAdapter.extract_token_usage(&raw), 120);
    }

    #[test]
    fn empty_choices_is_an_error_not_empty_text() {
        let raw = json!({"choices": []});
        assert!(OpenAiCompatibleAdapter.extract_content(&raw).is_err());
        assert_eq!(OpenAiCompatibleAdapter.extract_token_usage(&raw), 0);
    }
}
