//! Per-provider bookkeeping: request counts, cost and running latency.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use super::types::ProviderResult;
use crate::error::DatabaseError;

/// One provider's outcome in one round, as a delta to apply.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsUpdate {
    pub provider_id: i64,
    pub success: bool,
    pub latency: Duration,
    pub cost: Decimal,
}

impl StatsUpdate {
    pub fn from_result(result: &ProviderResult) -> Self {
        Self {
            provider_id: result.provider_id,
            success: result.is_success(),
            latency: result.latency,
            cost: result.cost,
        }
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Accumulated statistics for one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderStats {
    pub provider_id: i64,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_cost: Decimal,
    pub average_latency_ms: f64,
    pub last_used: Option<DateTime<Utc>>,
}

impl ProviderStats {
    pub fn new(provider_id: i64) -> Self {
        Self {
            provider_id,
            ..Self::default()
        }
    }

    /// Fold one update into the running totals.
    pub fn apply(&mut self, update: &StatsUpdate, now: DateTime<Utc>) {
        let old_count = self.requests as f64;
        self.requests += 1;
        if update.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_cost = self.total_cost.saturating_add(update.cost);
        self.average_latency_ms =
            (self.average_latency_ms * old_count + update.latency_ms()) / self.requests as f64;
        self.last_used = Some(now);
    }
}

/// Destination for stats updates.
#[async_trait]
pub trait StatsSink: Send + Sync {
    /// Apply one update atomically.
    async fn record_stats(&self, update: &StatsUpdate) -> Result<(), DatabaseError>;
}

/// Issues one update per attempted provider after a round settles.
#[derive(Clone)]
pub struct StatsRecorder {
    sink: Arc<dyn StatsSink>,
}

impl StatsRecorder {
    pub fn new(sink: Arc<dyn StatsSink>) -> Self {
        Self { sink }
    }

    /// Record every attempted provider. Sink errors are logged, not returned.
    ///
    /// Returns the number of updates the sink accepted.
    pub async fn record_round(&self, results: &[ProviderResult]) -> usize {
        let mut written = 0;
        for result in results {
            let update = StatsUpdate::from_result(result);
            match self.sink.record_stats(&update).await {
                Ok(()) => written += 1,
                Err(e) => warn!(
                    provider_id = update.provider_id,
                    provider = %result.label(),
                    error = %e,
                    "Failed to record provider stats"
                ),
            }
        }
        written
    }
}
