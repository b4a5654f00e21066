//! The multi-provider consensus engine.
//!
//! One request flows through [`Ensemble::analyze`]:
//!
//! ```text
//! AnalysisRequest → prompt → Dispatcher (all providers, concurrently)
//!     → validator → consensus → stats (every attempted provider)
//!     → audit records (every contributor) → ConsensusResult
//! ```

pub mod audit;
pub mod consensus;
pub mod dispatcher;
pub mod email;
pub mod probe;
pub mod prompt;
pub mod registry;
pub mod stats;
pub mod types;
pub mod validator;

pub use audit::{AnalysisRecord, AnalysisSink};
pub use dispatcher::{DEFAULT_TIMEOUT, Dispatcher, RoundOutcome};
pub use email::{IncomingEmail, request_from_rfc822};
pub use probe::{ProbeReport, probe_and_record};
pub use registry::ProviderRegistry;
pub use stats::{ProviderStats, StatsRecorder, StatsSink, StatsUpdate};
pub use types::{
    Analysis, AnalysisRequest, Category, ConsensusResult, Priority, ProviderResult, Sentiment,
};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::RoundError;
use crate::store::ProviderStore;

/// Runs analysis rounds against a fixed set of providers.
pub struct Ensemble {
    dispatcher: Dispatcher,
    registry: ProviderRegistry,
    stats: StatsRecorder,
    audit: Arc<dyn AnalysisSink>,
}

impl Ensemble {
    pub fn new(
        dispatcher: Dispatcher,
        registry: ProviderRegistry,
        stats: Arc<dyn StatsSink>,
        audit: Arc<dyn AnalysisSink>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            stats: StatsRecorder::new(stats),
            audit,
        }
    }

    /// Load the registry from `store` and write stats and audit records back to it.
    pub async fn from_store<S>(dispatcher: Dispatcher, store: Arc<S>) -> crate::Result<Self>
    where
        S: ProviderStore + StatsSink + AnalysisSink + 'static,
    {
        let registry = ProviderRegistry::from_store(store.as_ref()).await?;
        Ok(Self::new(dispatcher, registry, store.clone(), store))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Analyze one email.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<ConsensusResult, RoundError> {
        self.analyze_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Analyze one email; cancelling `cancel` abandons every in-flight call.
    ///
    /// Stats are written for every attempted provider, including when all of
    /// them fail or the round is cancelled; calls cut short by cancellation
    /// count as failures.
    pub async fn analyze_with_cancel(
        &self,
        request: &AnalysisRequest,
        cancel: &CancellationToken,
    ) -> Result<ConsensusResult, RoundError> {
        let outcome = self.dispatcher.run(request, &self.registry, cancel).await?;
        self.stats.record_round(&outcome.results).await;

        let consensus = outcome.into_consensus()?;
        self.record_contributions(&consensus).await;

        info!(
            correlation_id = %consensus.correlation_id,
            category = %consensus.analysis.category,
            priority = %consensus.analysis.priority,
            confidence = consensus.confidence(),
            providers_used = consensus.providers_used,
            excluded = consensus.excluded.len(),
            "Email analysis complete"
        );
        Ok(consensus)
    }

    /// Analyze emails one after another. A failed email is logged and
    /// reported in its slot; it does not stop the batch.
    pub async fn analyze_batch(
        &self,
        requests: &[AnalysisRequest],
    ) -> Vec<Result<ConsensusResult, RoundError>> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = self.analyze(request).await;
            if let Err(e) = &result {
                warn!(
                    correlation_id = %request.correlation_id(),
                    error = %e,
                    "Batch analysis failed for email"
                );
            }
            results.push(result);
        }

        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        info!(
            total = requests.len(),
            succeeded,
            failed = requests.len() - succeeded,
            "Batch analysis finished"
        );
        results
    }

    async fn record_contributions(&self, consensus: &ConsensusResult) {
        for result in &consensus.contributions {
            let Some(record) = AnalysisRecord::from_result(consensus.correlation_id, result) else {
                continue;
            };
            if let Err(e) = self.audit.record_analysis(&record).await {
                warn!(
                    correlation_id = %consensus.correlation_id,
                    provider_id = record.provider_id,
                    error = %e,
                    "Failed to store analysis record"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ProviderConfig, ProviderFamily};
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn empty_store_fails_with_no_providers() {
        let store = Arc::new(MemoryStore::new());
        let ensemble = Ensemble::from_store(Dispatcher::default(), store)
            .await
            .unwrap();
        let err = ensemble
            .analyze(&AnalysisRequest::new(None, "a@b.com", "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, RoundError::NoProviders));
    }

    #[tokio::test]
    async fn batch_keeps_going_after_failures() {
        let (store, _) = MemoryStore::with_providers([ProviderConfig::new(
            ProviderFamily::OpenAi,
            "gpt-4",
            "k",
        )
        .with_endpoint("http://127.0.0.1:9/v1/chat/completions")]);
        let store = Arc::new(store);
        let ensemble = Ensemble::from_store(Dispatcher::default(), store.clone())
            .await
            .unwrap();

        let requests = vec![
            AnalysisRequest::new(None, "a@b.com", "one"),
            AnalysisRequest::new(None, "c@d.com", "two"),
        ];
        let results = ensemble.analyze_batch(&requests).await;
        assert_eq!(results.len(), 2);
        assert!(
            results
                .iter()
                .all(|r| matches!(r, Err(RoundError::AllProvidersFailed { .. })))
        );

        let stats = store.provider_stats(1).await.unwrap();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.failures, 2);
    }
}
