//! Concurrent fan-out of one analysis request to every registered provider.
//!
//! Every provider call runs under its own timeout inside the caller's task
//! (`join_all`), so a round takes as long as its slowest provider and never
//! N × timeout. A provider that fails is recorded on its result; only
//! translation errors and an empty registry fail the round here. Calls still
//! in flight when the round is cancelled are recorded as cancelled failures.

use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::Url;
use reqwest::header::HeaderMap;
use rust_decimal::Decimal;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::consensus::build_consensus;
use super::prompt::build_analysis_prompt;
use super::registry::ProviderRegistry;
use super::types::{AnalysisRequest, ConsensusResult, ProviderResult};
use super::validator::validate;
use crate::error::{AdapterError, FailedProvider, ProviderFailure, RoundError};
use crate::llm::{CostTable, ProviderAdapter, ProviderConfig, adapter_for};

/// Per-provider timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Characters of an error response body kept in a failure.
const ERROR_BODY_EXCERPT: usize = 300;

/// Sends provider calls and turns the replies into results.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    timeout: Duration,
    costs: CostTable,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, CostTable::default())
    }
}

impl Dispatcher {
    pub fn new(timeout: Duration, costs: CostTable) -> Self {
        Self::with_client(reqwest::Client::new(), timeout, costs)
    }

    /// Use an existing HTTP client (shared connection pool).
    pub fn with_client(client: reqwest::Client, timeout: Duration, costs: CostTable) -> Self {
        Self {
            client,
            timeout,
            costs,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one round: every provider in `registry` receives the same prompt.
    ///
    /// Returns every attempted result, failed ones included. Cancelling
    /// `cancel` ends every in-flight call at once; the outcome is then
    /// marked cancelled and [`RoundOutcome::into_consensus`] refuses it.
    pub async fn run(
        &self,
        request: &AnalysisRequest,
        registry: &ProviderRegistry,
        cancel: &CancellationToken,
    ) -> Result<RoundOutcome, RoundError> {
        if registry.is_empty() {
            return Err(RoundError::NoProviders);
        }

        let correlation_id = request.correlation_id();
        let prompt = build_analysis_prompt(request);

        // Translate everything up front so a bad config never sends a partial round.
        let calls = registry
            .iter()
            .map(|config| PreparedCall::new(config, &prompt))
            .collect::<Result<Vec<_>, AdapterError>>()?;

        info!(
            correlation_id = %correlation_id,
            providers = calls.len(),
            timeout_secs = self.timeout.as_secs(),
            "Dispatching analysis round"
        );

        let results = join_all(
            calls
                .iter()
                .map(|call| self.analyze_one(call, correlation_id, cancel)),
        )
        .await;

        let cancelled = cancel.is_cancelled();
        if cancelled {
            warn!(correlation_id = %correlation_id, "Analysis round cancelled");
        }

        Ok(RoundOutcome {
            correlation_id,
            results,
            cancelled,
        })
    }

    /// Send `prompt` to a single provider and return the raw exchange.
    pub async fn exchange(
        &self,
        config: &ProviderConfig,
        prompt: &str,
    ) -> Result<Exchange, AdapterError> {
        let call = PreparedCall::new(config, prompt)?;
        Ok(self.execute(&call).await)
    }

    async fn analyze_one(
        &self,
        call: &PreparedCall<'_>,
        correlation_id: Uuid,
        cancel: &CancellationToken,
    ) -> ProviderResult {
        let started = Instant::now();
        let exchange = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let latency = started.elapsed();
                Exchange {
                    latency,
                    outcome: Err(ProviderFailure::Cancelled(latency)),
                }
            }
            exchange = self.execute(call) => exchange,
        };
        let result = exchange.into_result(call.config);

        match result.failure() {
            None => debug!(
                correlation_id = %correlation_id,
                provider = %call.config.family,
                model = %call.config.model,
                latency_ms = result.latency.as_millis() as u64,
                tokens = result.tokens_used,
                "Provider analysis accepted"
            ),
            Some(failure) => warn!(
                correlation_id = %correlation_id,
                provider = %call.config.family,
                model = %call.config.model,
                latency_ms = result.latency.as_millis() as u64,
                kind = failure.label(),
                error = %failure,
                "Provider excluded from round"
            ),
        }
        result
    }

    /// Send one prepared call under the timeout, then read the envelope.
    async fn execute(&self, call: &PreparedCall<'_>) -> Exchange {
        let started = Instant::now();
        let sent = tokio::time::timeout(self.timeout, self.send(call)).await;
        let latency = started.elapsed();

        let outcome = match sent {
            Err(_) => Err(ProviderFailure::Timeout(self.timeout)),
            Ok(Err(failure)) => Err(failure),
            Ok(Ok((body, envelope))) => self.read_reply(call, body, &envelope),
        };
        Exchange { latency, outcome }
    }

    async fn send(&self, call: &PreparedCall<'_>) -> Result<(String, Value), ProviderFailure> {
        let response = self
            .client
            .post(call.url.clone())
            .headers(call.headers.clone())
            .json(&call.body)
            .send()
            .await
            .map_err(|e| ProviderFailure::Transport(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderFailure::Transport(e.without_url().to_string()))?;

        if !status.is_success() {
            return Err(ProviderFailure::HttpStatus {
                status: status.as_u16(),
                body: body.chars().take(ERROR_BODY_EXCERPT).collect(),
            });
        }

        let envelope: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderFailure::Envelope(format!("response is not JSON: {e}")))?;
        Ok((body, envelope))
    }

    fn read_reply(
        &self,
        call: &PreparedCall<'_>,
        body: String,
        envelope: &Value,
    ) -> Result<Reply, ProviderFailure> {
        let content = call
            .adapter
            .extract_content(envelope)
            .map_err(|e| ProviderFailure::Envelope(e.to_string()))?;
        let tokens_used = call.adapter.extract_token_usage(envelope);
        let cost = self
            .costs
            .cost(call.config.family, &call.config.model, tokens_used);

        Ok(Reply {
            content,
            tokens_used,
            cost,
            response_bytes: body.len(),
            raw_response: body,
        })
    }
}

/// A provider call with everything translated, ready to send.
struct PreparedCall<'a> {
    config: &'a ProviderConfig,
    adapter: &'static dyn ProviderAdapter,
    url: Url,
    headers: HeaderMap,
    body: Value,
}

impl<'a> PreparedCall<'a> {
    fn new(config: &'a ProviderConfig, prompt: &str) -> Result<Self, AdapterError> {
        let adapter = adapter_for(config.family);
        Ok(Self {
            config,
            adapter,
            url: adapter.build_endpoint(config)?,
            headers: adapter.build_headers(config)?,
            body: adapter.build_request(config, prompt),
        })
    }
}

/// A provider's reply content plus accounting.
#[derive(Debug, Clone)]
pub struct Reply {
    pub content: String,
    pub tokens_used: u64,
    pub cost: Decimal,
    pub response_bytes: usize,
    pub raw_response: String,
}

/// One provider call, before the reply is validated.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub latency: Duration,
    pub outcome: Result<Reply, ProviderFailure>,
}

impl Exchange {
    /// Validate the reply into an analysis result for `config`.
    pub fn into_result(self, config: &ProviderConfig) -> ProviderResult {
        match self.outcome {
            Err(failure) => ProviderResult::failed(config, failure, self.latency),
            Ok(reply) => ProviderResult {
                provider_id: config.id,
                family: config.family,
                model: config.model.clone(),
                priority_weight: config.priority_weight,
                outcome: validate(&reply.content).map_err(ProviderFailure::from),
                latency: self.latency,
                tokens_used: reply.tokens_used,
                cost: reply.cost,
                response_bytes: reply.response_bytes,
                raw_response: Some(reply.raw_response),
            },
        }
    }
}

/// Everything attempted in one round.
#[derive(Debug, Clone)]
pub struct RoundOutcome {
    pub correlation_id: Uuid,
    /// One entry per attempted provider, in registry order.
    pub results: Vec<ProviderResult>,
    /// The round's token fired before every call settled.
    pub cancelled: bool,
}

impl RoundOutcome {
    pub fn successes(&self) -> impl Iterator<Item = &ProviderResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    pub fn failures(&self) -> Vec<FailedProvider> {
        self.results
            .iter()
            .filter_map(ProviderResult::as_failed_provider)
            .collect()
    }

    /// Fuse the successful results, or fail when the round was cancelled
    /// or none succeeded.
    pub fn into_consensus(self) -> Result<ConsensusResult, RoundError> {
        let correlation_id = self.correlation_id;
        if self.cancelled {
            return Err(RoundError::Cancelled(correlation_id));
        }
        let failures = self.failures();
        build_consensus(correlation_id, self.results).map_err(|_| {
            RoundError::AllProvidersFailed {
                correlation_id,
                failures,
            }
        })
    }
}
