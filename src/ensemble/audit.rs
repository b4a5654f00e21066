//! Per-provider analysis records kept for auditing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::types::{Analysis, ProviderResult};
use crate::error::DatabaseError;

/// What one successful provider said about one email.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRecord {
    pub correlation_id: Uuid,
    pub provider_id: i64,
    pub analysis: Analysis,
    pub latency_ms: u64,
    pub tokens_used: u64,
    pub cost: Decimal,
    pub raw_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Build a record from a successful result; `None` for failures.
    pub fn from_result(correlation_id: Uuid, result: &ProviderResult) -> Option<Self> {
        let analysis = result.analysis()?.clone();
        Some(Self {
            correlation_id,
            provider_id: result.provider_id,
            analysis,
            latency_ms: result.latency.as_millis() as u64,
            tokens_used: result.tokens_used,
            cost: result.cost,
            raw_response: result.raw_response.clone(),
            created_at: Utc::now(),
        })
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AnalysisSink: Send + Sync {
    async fn record_analysis(&self, record: &AnalysisRecord) -> Result<(), DatabaseError>;
}
