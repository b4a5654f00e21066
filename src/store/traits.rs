//! Backend-agnostic provider store.
//!
//! Stats and audit writes go through [`StatsSink`](crate::ensemble::StatsSink)
//! and [`AnalysisSink`](crate::ensemble::AnalysisSink); every backend in this
//! module implements those alongside [`ProviderStore`].

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::ensemble::{AnalysisRecord, ProviderStats};
use crate::error::DatabaseError;
use crate::llm::ProviderConfig;

/// Operational status of a stored provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Eligible for rounds.
    Active,
    /// Switched off by an operator.
    Inactive,
    /// Last probe failed.
    Error,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            other => Err(DatabaseError::Serialization(format!(
                "unknown provider status: {other}"
            ))),
        }
    }
}

/// A provider row with its status and stats.
#[derive(Debug, Clone)]
pub struct StoredProvider {
    pub config: ProviderConfig,
    pub status: ProviderStatus,
    pub last_error: Option<String>,
    pub stats: ProviderStats,
}

#[async_trait]
pub trait ProviderStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    /// Insert a provider; returns its new id. `config.id` is ignored.
    async fn insert_provider(&self, config: &ProviderConfig) -> Result<i64, DatabaseError>;

    /// Enabled providers with status `active`, by descending priority weight.
    async fn load_enabled_providers(&self) -> Result<Vec<ProviderConfig>, DatabaseError>;

    /// Every provider, in id order.
    async fn list_providers(&self) -> Result<Vec<StoredProvider>, DatabaseError>;

    /// Fails with `NotFound` for an unknown id.
    async fn get_provider(&self, id: i64) -> Result<ProviderConfig, DatabaseError>;

    async fn set_provider_status(
        &self,
        id: i64,
        status: ProviderStatus,
        last_error: Option<&str>,
    ) -> Result<(), DatabaseError>;

    async fn provider_stats(&self, id: i64) -> Result<ProviderStats, DatabaseError>;

    /// Audit records written for one request, oldest first.
    async fn analyses_for(&self, correlation_id: Uuid)
    -> Result<Vec<AnalysisRecord>, DatabaseError>;
}

pub(crate) fn provider_not_found(id: i64) -> DatabaseError {
    DatabaseError::NotFound {
        entity: "provider".into(),
        id: id.to_string(),
    }
}
