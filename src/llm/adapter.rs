//! The `ProviderAdapter` trait and the enum-keyed adapter factory.

use reqwest::Url;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;

use super::anthropic::AnthropicAdapter;
use super::cohere::CohereAdapter;
use super::gemini::GeminiAdapter;
use super::openai_compat::OpenAiCompatibleAdapter;
use super::qwen::QwenAdapter;
use super::{ProviderConfig, ProviderFamily};
use crate::error::AdapterError;

/// Bidirectional translation between canonical shapes and one wire protocol.
///
/// Implementations hold no state and perform no I/O.
pub trait ProviderAdapter: Send + Sync {
    /// Protocol name for error messages (e.g. "openai-compatible").
    fn protocol(&self) -> &'static str;

    /// Build the JSON request body for `prompt`, honoring token limit and temperature.
    fn build_request(&self, config: &ProviderConfig, prompt: &str) -> Value;

    /// Build request headers, injecting the credential where this protocol expects it.
    fn build_headers(&self, config: &ProviderConfig) -> Result<HeaderMap, AdapterError>;

    /// Resolve the request URL. Defaults to the override or the family endpoint.
    fn build_endpoint(&self, config: &ProviderConfig) -> Result<Url, AdapterError> {
        let raw = config
            .endpoint
            .as_deref()
            .unwrap_or_else(|| config.family.default_endpoint());
        parse_endpoint(config, raw)
    }

    /// Pull the assistant's free-text reply out of the response envelope.
    fn extract_content(&self, raw: &Value) -> Result<String, AdapterError>;

    /// Total tokens consumed, or 0 when the provider omits usage data.
    fn extract_token_usage(&self, raw: &Value) -> u64;
}

/// Select the adapter for a provider family.
pub fn adapter_for(family: ProviderFamily) -> &'static dyn ProviderAdapter {
    match family {
        ProviderFamily::OpenAi
        | ProviderFamily::Groq
        | ProviderFamily::Mistral
        | ProviderFamily::Together => &OpenAiCompatibleAdapter,
        ProviderFamily::Anthropic => &AnthropicAdapter,
        ProviderFamily::Google => &GeminiAdapter,
        ProviderFamily::Qwen => &QwenAdapter,
        ProviderFamily::Cohere => &CohereAdapter,
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

/// Parse an endpoint string into a URL, mapping failures to `AdapterError`.
pub(crate) fn parse_endpoint(config: &ProviderConfig, raw: &str) -> Result<Url, AdapterError> {
    Url::parse(raw).map_err(|e| AdapterError::InvalidEndpoint {
        provider: config.family.to_string(),
        reason: e.to_string(),
    })
}

/// Headers every provider receives.
pub(crate) fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Insert a credential-bearing header, marked sensitive so it is never printed.
pub(crate) fn insert_secret_header(
    headers: &mut HeaderMap,
    config: &ProviderConfig,
    name: HeaderName,
    value: String,
) -> Result<(), AdapterError> {
    let mut value = HeaderValue::from_str(&value).map_err(|_| AdapterError::InvalidHeader {
        provider: config.family.to_string(),
        name: name.to_string(),
    })?;
    value.set_sensitive(true);
    headers.insert(name, value);
    Ok(())
}

/// JSON headers plus `Authorization: Bearer <key>`.
pub(crate) fn bearer_headers(config: &ProviderConfig) -> Result<HeaderMap, AdapterError> {
    let mut headers = json_headers();
    insert_secret_header(
        &mut headers,
        config,
        reqwest::header::AUTHORIZATION,
        format!("Bearer {}", config.api_key.expose_secret()),
    )?;
    Ok(headers)
}

/// Single-turn user message array shared by the chat-style protocols.
pub(crate) fn user_messages(prompt: &str) -> Value {
    serde_json::json!([{ "role": "user", "content": prompt }])
}

/// Read a string at a JSON pointer, or fail with the pointer path.
pub(crate) fn content_at(
    raw: &Value,
    pointer: &str,
    protocol: &str,
) -> Result<String, AdapterError> {
    raw.pointer(pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AdapterError::MissingContent {
            provider: protocol.to_string(),
            path: pointer.to_string(),
        })
}

/// Read an unsigned integer at a JSON pointer, defaulting to 0.
pub(crate) fn tokens_at(raw: &Value, pointer: &str) -> u64 {
    raw.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_maps_compatible_families_to_one_protocol() {
        for family in [
            ProviderFamily::OpenAi,
            ProviderFamily::Groq,
            ProviderFamily::Mistral,
            ProviderFamily::Together,
        ] {
            assert_eq!(adapter_for(family).protocol(), "openai-compatible");
        }
        assert_eq!(adapter_for(ProviderFamily::Anthropic).protocol(), "anthropic");
        assert_eq!(adapter_for(ProviderFamily::Google).protocol(), "gemini");
        assert_eq!(adapter_for(ProviderFamily::Qwen).protocol(), "qwen");
        assert_eq!(adapter_for(ProviderFamily::Cohere).protocol(), "cohere");
    }

    #[test]
    fn default_endpoint_respects_override() {
        let config = ProviderConfig::new(ProviderFamily::Groq, "gemma-7b-it", "k");
        let url = adapter_for(config.family).build_endpoint(&config).unwrap();
        assert_eq!(url.as_str(), "https://api.groq.com/openai/v1/chat/completions");

        let config = config.with_endpoint("http://127.0.0.1:9000/v1/chat/completions");
        let url = adapter_for(config.family).build_endpoint(&config).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9000/v1/chat/completions");
    }

    #[test]
    fn invalid_override_is_an_adapter_error() {
        let config = ProviderConfig::new(ProviderFamily::Mistral, "m", "k").with_endpoint("::");
        let err = adapter_for(config.family).build_endpoint(&config).unwrap_err();
        assert!(matches!(err, AdapterError::InvalidEndpoint { .. }));
    }

    #[test]
    fn credential_header_is_sensitive() {
        let config = ProviderConfig::new(ProviderFamily::OpenAi, "gpt-4", "sk-abc");
        let headers = bearer_headers(&config).unwrap();
        let auth = headers.get(reqwest::header::AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());
        assert_eq!(auth.to_str().unwrap(), "Bearer sk-abc");
        assert!(!format!("{headers:?}").contains("sk-abc"));
    }

    #[test]
    fn credential_with_newline_is_rejected() {
        let config = ProviderConfig::new(ProviderFamily::OpenAi, "gpt-4", "bad\nkey");
        assert!(matches!(
            bearer_headers(&config),
            Err(AdapterError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn token_lookup_defaults_to_zero() {
        let raw = serde_json::json!({"usage": {"total_tokens": "many"}});
        assert_eq!(tokens_at(&raw, "/usage/total_tokens"), 0);
        assert_eq!(tokens_at(&raw, "/missing"), 0);
    }
}
