//! Google Gemini `generateContent` protocol.
//!
//! The model id lives in the URL path and the credential in the `key`
//! query parameter, so neither appears in the body or headers.

use reqwest::Url;
use reqwest::header::HeaderMap;
use secrecy::ExposeSecret;
use serde_json::{Value, json};

use super::ProviderConfig;
use super::adapter::{ProviderAdapter, content_at, json_headers, parse_endpoint, tokens_at};
use crate::error::AdapterError;

const PROTOCOL: &str = "gemini";

pub(crate) struct GeminiAdapter;

impl ProviderAdapter for GeminiAdapter {
    fn protocol(&self) -> &'static str {
        PROTOCOL
    }

    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value {
        json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "maxOutputTokens": config.max_tokens,
                "temperature": config.temperature,
            },
        })
    }

    fn build_headers(&self, _config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
        Ok(json_headers())
    }

    fn build_endpoint(&self, config: &ProviderConfig) -> Result<Url, AdapterError> {
        let template = config
            .endpoint
            .as_deref()
            .unwrap_or_else(|| config.family.default_endpoint());
        let mut url = parse_endpoint(config, &template.replace("{model}", &config.model))?;
        url.query_pairs_mut()
            .append_pair("key", config.api_key.expose_secret());
        Ok(url)
    }

    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError> {
        content_at(raw, "/candidates/0/content/parts/0/text", PROTOCOL)
    }

    fn extract_token_usage(&self, raw: &Value) -> u64 {
        tokens_at(raw, "/usageMetadata/totalTokenCount")
    }
}
