//! Connection test for a single provider.

use serde::Serialize;
use tracing::{info, warn};

use super::dispatcher::Dispatcher;
use super::prompt::PROBE_PROMPT;
use crate::store::{ProviderStatus, ProviderStore};

/// Token limit used for probe calls.
pub const PROBE_MAX_TOKENS: u32 = 100;

/// Temperature used for probe calls.
pub const PROBE_TEMPERATURE: f32 = 0.1;

/// Outcome of a probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    pub provider_id: i64,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

/// Probe provider `id` and record the result as its status.
///
/// A provider passes when it answers 2xx with readable content; the reply
/// is not held to the analysis schema.
pub async fn probe_and_record(
    dispatcher: &Dispatcher,
    store: &dyn ProviderStore,
    id: i64,
) -> crate::Result<ProbeReport> {
    let config = store
        .get_provider(id)
        .await?
        .with_max_tokens(PROBE_MAX_TOKENS)
        .with_temperature(PROBE_TEMPERATURE);

    let outcome = match dispatcher.exchange(&config, PROBE_PROMPT).await {
        Ok(exchange) => exchange
            .outcome
            .map(|reply| (exchange.latency, reply.tokens_used))
            .map_err(|failure| failure.to_string()),
        Err(e) => Err(e.to_string()),
    };

    let report = match outcome {
        Ok((latency, tokens)) => {
            store
                .set_provider_status(id, ProviderStatus::Active, None)
                .await?;
            info!(
                provider_id = id,
                provider = %config.label(),
                latency_ms = latency.as_millis() as u64,
                "Provider probe succeeded"
            );
            ProbeReport {
                provider_id: id,
                success: true,
                message: "Provider test successful".into(),
                latency_ms: Some(latency.as_millis() as u64),
                tokens_used: Some(tokens),
            }
        }
        Err(reason) => {
            store
                .set_provider_status(id, ProviderStatus::Error, Some(&reason))
                .await?;
            warn!(
                provider_id = id,
                provider = %config.label(),
                error = %reason,
                "Provider probe failed"
            );
            ProbeReport {
                provider_id: id,
                success: false,
                message: format!("Provider test failed: {reason}"),
                latency_ms: None,
                tokens_used: None,
            }
        }
    };
    Ok(report)
}
