//! In-memory store for tests and dry runs.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::traits::{ProviderStatus, ProviderStore, StoredProvider, provider_not_found};
use crate::ensemble::{AnalysisRecord, AnalysisSink, ProviderStats, StatsSink, StatsUpdate};
use crate::error::DatabaseError;
use crate::llm::ProviderConfig;

#[derive(Default)]
struct State {
    providers: Vec<StoredProvider>,
    analyses: Vec<AnalysisRecord>,
    next_id: i64,
}

/// Same contract as the libSQL backend, held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with `configs`; returns it with their new ids.
    pub fn with_providers(configs: impl IntoIterator<Item = ProviderConfig>) -> (Self, Vec<i64>) {
        let store = Self::new();
        let ids = {
            let mut state = store.state.lock().unwrap_or_else(|e| e.into_inner());
            configs
                .into_iter()
                .map(|config| state.insert(config))
                .collect()
        };
        (store, ids)
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, DatabaseError> {
        self.state
            .lock()
            .map_err(|_| DatabaseError::Pool("memory store lock poisoned".into()))
    }
}

impl State {
    fn insert(&mut self, mut config: ProviderConfig) -> i64 {
        self.next_id += 1;
        config.id = self.next_id;
        self.providers.push(StoredProvider {
            config,
            status: ProviderStatus::Active,
            last_error: None,
            stats: ProviderStats::new(self.next_id),
        });
        self.next_id
    }

    fn find_mut(&mut self, id: i64) -> Result<&mut StoredProvider, DatabaseError> {
        self.providers
            .iter_mut()
            .find(|p| p.config.id == id)
            .ok_or_else(|| provider_not_found(id))
    }
}

#[async_trait]
impl ProviderStore for MemoryStore {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn insert_provider(&self, config: &ProviderConfig) -> Result<i64, DatabaseError> {
        Ok(self.state()?.insert(config.clone()))
    }

    async fn load_enabled_providers(&self) -> Result<Vec<ProviderConfig>, DatabaseError> {
        let state = self.state()?;
        let mut enabled: Vec<ProviderConfig> = state
            .providers
            .iter()
            .filter(|p| p.config.enabled && p.status == ProviderStatus::Active)
            .map(|p| p.config.clone())
            .collect();
        enabled.sort_by(|a, b| b.priority_weight.total_cmp(&a.priority_weight));
        Ok(enabled)
    }

    async fn list_providers(&self) -> Result<Vec<StoredProvider>, DatabaseError> {
        Ok(self.state()?.providers.clone())
    }

    async fn get_provider(&self, id: i64) -> Result<ProviderConfig, DatabaseError> {
        Ok(self.state()?.find_mut(id)?.config.clone())
    }

    async fn set_provider_status(
        &self,
        id: i64,
        status: ProviderStatus,
        last_error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state()?;
        let provider = state.find_mut(id)?;
        provider.status = status;
        provider.last_error = last_error.map(str::to_string);
        Ok(())
    }

    async fn provider_stats(&self, id: i64) -> Result<ProviderStats, DatabaseError> {
        Ok(self.state()?.find_mut(id)?.stats.clone())
    }

    async fn analyses_for(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<AnalysisRecord>, DatabaseError> {
        Ok(self
            .state()?
            .analyses
            .iter()
            .filter(|r| r.correlation_id == correlation_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StatsSink for MemoryStore {
    async fn record_stats(&self, update: &StatsUpdate) -> Result<(), DatabaseError> {
        let mut state = self.state()?;
        state
            .find_mut(update.provider_id)?
            .stats
            .apply(update, Utc::now());
        Ok(())
    }
}

#[async_trait]
impl AnalysisSink for MemoryStore {
    async fn record_analysis(&self, record: &AnalysisRecord) -> Result<(), DatabaseError> {
        self.state()?.analyses.push(record.clone());
        Ok(())
    }
}
