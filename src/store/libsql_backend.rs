//! libSQL backend for providers, stats and audit records.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use tracing::{debug, info};
use uuid::Uuid;

use super::traits::{ProviderStatus, ProviderStore, StoredProvider, provider_not_found};
use super::{cost_from_nanos, cost_to_nanos};
use crate::ensemble::{
    Analysis, AnalysisRecord, AnalysisSink, Category, Priority, ProviderStats, Sentiment,
    StatsSink, StatsUpdate,
};
use crate::error::DatabaseError;
use crate::llm::{ProviderConfig, ProviderFamily};
use crate::store::migrations;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests and dry runs).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn serialization(context: &str, e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Serialization(format!("{context}: {e}"))
}

const PROVIDER_COLUMNS: &str =
    "id, family, model, api_key, endpoint, priority_weight, max_tokens, temperature, is_enabled";

const STATS_COLUMNS: &str = "id, requests_count, successful_requests, failed_requests, total_cost_nanos, average_response_time_ms, last_used";

const ANALYSIS_COLUMNS: &str = "correlation_id, ai_provider_id, category, priority, sentiment, confidence, summary, action_required, suggested_actions, processing_time_ms, tokens_used, cost, raw_response, created_at";

/// Map columns 0..=8 (PROVIDER_COLUMNS) to a ProviderConfig.
fn row_to_provider(row: &libsql::Row) -> Result<ProviderConfig, DatabaseError> {
    let get_err = |e: libsql::Error| serialization("provider row", e);

    let family: String = row.get(1).map_err(get_err)?;
    let family = family
        .parse::<ProviderFamily>()
        .map_err(|e| serialization("provider family", e))?;
    let api_key: String = row.get(3).map_err(get_err)?;

    let mut config = ProviderConfig::new(family, row.get::<String>(2).map_err(get_err)?, api_key)
        .with_id(row.get(0).map_err(get_err)?)
        .with_weight(row.get(5).map_err(get_err)?)
        .with_max_tokens(row.get::<i64>(6).map_err(get_err)?.clamp(0, u32::MAX as i64) as u32)
        .with_temperature(row.get::<f64>(7).map_err(get_err)? as f32);
    config.endpoint = row.get::<String>(4).ok();
    config.enabled = row.get::<i64>(8).map_err(get_err)? != 0;
    Ok(config)
}

/// Map STATS_COLUMNS starting at `offset` to ProviderStats.
fn row_to_stats(row: &libsql::Row, offset: i32) -> Result<ProviderStats, DatabaseError> {
    let get_err = |e: libsql::Error| serialization("stats row", e);
    let count = |idx: i32| -> Result<u64, DatabaseError> {
        Ok(row.get::<i64>(offset + idx).map_err(get_err)?.max(0) as u64)
    };

    Ok(ProviderStats {
        provider_id: row.get(offset).map_err(get_err)?,
        requests: count(1)?,
        successes: count(2)?,
        failures: count(3)?,
        total_cost: cost_from_nanos(row.get(offset + 4).map_err(get_err)?),
        average_latency_ms: row.get(offset + 5).map_err(get_err)?,
        last_used: row
            .get::<String>(offset + 6)
            .ok()
            .map(|s| parse_datetime(&s)),
    })
}

fn row_to_analysis(row: &libsql::Row) -> Result<AnalysisRecord, DatabaseError> {
    let get_err = |e: libsql::Error| serialization("analysis row", e);

    let correlation_id: String = row.get(0).map_err(get_err)?;
    let category: String = row.get(2).map_err(get_err)?;
    let priority: String = row.get(3).map_err(get_err)?;
    let sentiment: String = row.get(4).map_err(get_err)?;
    let suggested_actions = match row.get::<String>(8).ok() {
        Some(json) => {
            serde_json::from_str(&json).map_err(|e| serialization("suggested_actions", e))?
        }
        None => Vec::new(),
    };
    let cost: String = row.get(11).map_err(get_err)?;
    let created_at: String = row.get(13).map_err(get_err)?;

    Ok(AnalysisRecord {
        correlation_id: Uuid::parse_str(&correlation_id)
            .map_err(|e| serialization("correlation_id", e))?,
        provider_id: row.get(1).map_err(get_err)?,
        analysis: Analysis {
            category: Category::from_label(&category)
                .ok_or_else(|| serialization("category", &category))?,
            priority: Priority::from_label(&priority)
                .ok_or_else(|| serialization("priority", &priority))?,
            sentiment: Sentiment::from_label(&sentiment)
                .ok_or_else(|| serialization("sentiment", &sentiment))?,
            confidence: row.get(5).map_err(get_err)?,
            summary: row.get::<String>(6).ok(),
            action_required: row.get::<i64>(7).ok().map(|v| v != 0),
            suggested_actions,
        },
        latency_ms: row.get::<i64>(9).map_err(get_err)?.max(0) as u64,
        tokens_used: row.get::<i64>(10).map_err(get_err)?.max(0) as u64,
        cost: cost
            .parse::<Decimal>()
            .map_err(|e| serialization("cost", e))?,
        raw_response: row.get::<String>(12).ok(),
        created_at: parse_datetime(&created_at),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ProviderStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn insert_provider(&self, config: &ProviderConfig) -> Result<i64, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO ai_providers (family, model, api_key, endpoint, priority_weight, max_tokens, temperature, is_enabled) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                config.family.as_str(),
                config.model.as_str(),
                config.api_key.expose_secret(),
                opt_text(config.endpoint.as_deref()),
                config.priority_weight,
                config.max_tokens as i64,
                config.temperature as f64,
                config.enabled as i64,
            ],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("insert_provider: {e}")))?;

        let id = conn.last_insert_rowid();
        debug!(provider_id = id, provider = %config.label(), "Provider inserted");
        Ok(id)
    }

    async fn load_enabled_providers(&self) -> Result<Vec<ProviderConfig>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROVIDER_COLUMNS} FROM ai_providers \
                     WHERE is_enabled = 1 AND status = 'active' \
                     ORDER BY priority_weight DESC, id ASC"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("load_enabled_providers: {e}")))?;

        let mut providers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("load_enabled_providers: {e}")))?
        {
            providers.push(row_to_provider(&row)?);
        }
        Ok(providers)
    }

    async fn list_providers(&self) -> Result<Vec<StoredProvider>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROVIDER_COLUMNS}, status, last_error, {STATS_COLUMNS} \
                     FROM ai_providers ORDER BY id"
                ),
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_providers: {e}")))?;

        let mut providers = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_providers: {e}")))?
        {
            let status: String = row
                .get(9)
                .map_err(|e| serialization("provider status", e))?;
            providers.push(StoredProvider {
                config: row_to_provider(&row)?,
                status: status.parse()?,
                last_error: row.get::<String>(10).ok(),
                stats: row_to_stats(&row, 11)?,
            });
        }
        Ok(providers)
    }

    async fn get_provider(&self, id: i64) -> Result<ProviderConfig, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PROVIDER_COLUMNS} FROM ai_providers WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_provider: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_provider(&row),
            Ok(None) => Err(provider_not_found(id)),
            Err(e) => Err(DatabaseError::Query(format!("get_provider: {e}"))),
        }
    }

    async fn set_provider_status(
        &self,
        id: i64,
        status: ProviderStatus,
        last_error: Option<&str>,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE ai_providers SET status = ?1, last_error = ?2, updated_at = ?3 WHERE id = ?4",
                params![status.as_str(), opt_text(last_error), now, id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_provider_status: {e}")))?;

        if changed == 0 {
            return Err(provider_not_found(id));
        }
        debug!(provider_id = id, status = %status, "Provider status updated");
        Ok(())
    }

    async fn provider_stats(&self, id: i64) -> Result<ProviderStats, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {STATS_COLUMNS} FROM ai_providers WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("provider_stats: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => row_to_stats(&row, 0),
            Ok(None) => Err(provider_not_found(id)),
            Err(e) => Err(DatabaseError::Query(format!("provider_stats: {e}"))),
        }
    }

    async fn analyses_for(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<AnalysisRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {ANALYSIS_COLUMNS} FROM ai_analysis_results \
                     WHERE correlation_id = ?1 ORDER BY id"
                ),
                params![correlation_id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("analyses_for: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("analyses_for: {e}")))?
        {
            records.push(row_to_analysis(&row)?);
        }
        Ok(records)
    }
}

#[async_trait]
impl StatsSink for LibSqlBackend {
    /// One statement: SQLite evaluates every right-hand side against the
    /// row's values from before the update.
    async fn record_stats(&self, update: &StatsUpdate) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn()
            .execute(
                "UPDATE ai_providers SET \
                    requests_count = requests_count + 1, \
                    successful_requests = successful_requests + ?1, \
                    failed_requests = failed_requests + ?2, \
                    total_cost_nanos = CASE WHEN total_cost_nanos > 9223372036854775807 - ?3 \
                        THEN 9223372036854775807 ELSE total_cost_nanos + ?3 END, \
                    average_response_time_ms = \
                        (average_response_time_ms * requests_count + ?4) / (requests_count + 1), \
                    last_used = ?5, \
                    updated_at = ?5 \
                 WHERE id = ?6",
                params![
                    update.success as i64,
                    (!update.success) as i64,
                    cost_to_nanos(update.cost),
                    update.latency_ms(),
                    now,
                    update.provider_id,
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_stats: {e}")))?;

        if changed == 0 {
            return Err(provider_not_found(update.provider_id));
        }
        Ok(())
    }
}

#[async_trait]
impl AnalysisSink for LibSqlBackend {
    async fn record_analysis(&self, record: &AnalysisRecord) -> Result<(), DatabaseError> {
        let analysis = &record.analysis;
        let suggested_actions = if analysis.suggested_actions.is_empty() {
            None
        } else {
            Some(
                serde_json::to_string(&analysis.suggested_actions)
                    .map_err(|e| serialization("suggested_actions", e))?,
            )
        };
        let action_required = match analysis.action_required {
            Some(flag) => libsql::Value::Integer(flag as i64),
            None => libsql::Value::Null,
        };

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO ai_analysis_results ({ANALYSIS_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    record.correlation_id.to_string(),
                    record.provider_id,
                    analysis.category.as_str(),
                    analysis.priority.as_str(),
                    analysis.sentiment.as_str(),
                    analysis.confidence,
                    opt_text(analysis.summary.as_deref()),
                    action_required,
                    opt_text(suggested_actions.as_deref()),
                    i64::try_from(record.latency_ms).unwrap_or(i64::MAX),
                    i64::try_from(record.tokens_used).unwrap_or(i64::MAX),
                    record.cost.to_string(),
                    opt_text(record.raw_response.as_deref()),
                    record.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("record_analysis: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal_macros::dec;

    use super::*;

    async fn test_db() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    fn assert_send<T: Send>(_: T) {}

    #[tokio::test]
    async fn migrations_run_on_a_spawned_task() {
        let db = Arc::new(test_db().await);
        assert_send(migrations::run_migrations(db.conn()));

        let spawned = db.clone();
        tokio::spawn(async move { spawned.run_migrations().await })
            .await
            .unwrap()
            .unwrap();
        assert!(db.list_providers().await.unwrap().is_empty());
    }

    fn provider(family: ProviderFamily, model: &str, weight: f64) -> ProviderConfig {
        ProviderConfig::new(family, model, "sk-test").with_weight(weight)
    }

    fn update(id: i64, success: bool, ms: u64, cost: Decimal) -> StatsUpdate {
        StatsUpdate {
            provider_id: id,
            success,
            latency: Duration::from_millis(ms),
            cost,
        }
    }

    #[tokio::test]
    async fn insert_and_get_provider() {
        let db = test_db().await;
        let config = provider(ProviderFamily::Google, "gemini-pro", 1.5)
            .with_endpoint("http://localhost:1234/models/{model}:generateContent")
            .with_max_tokens(512);
        let id = db.insert_provider(&config).await.unwrap();

        let fetched = db.get_provider(id).await.unwrap();
        assert_eq!(fetched.id, id);
        assert_eq!(fetched.family, ProviderFamily::Google);
        assert_eq!(fetched.model, "gemini-pro");
        assert_eq!(fetched.priority_weight, 1.5);
        assert_eq!(fetched.max_tokens, 512);
        assert_eq!(fetched.temperature, config.temperature);
        assert_eq!(fetched.endpoint, config.endpoint);
        assert_eq!(fetched.api_key.expose_secret(), "sk-test");
        assert!(fetched.enabled);
    }

    #[tokio::test]
    async fn get_unknown_provider_is_not_found() {
        let db = test_db().await;
        assert!(matches!(
            db.get_provider(42).await,
            Err(DatabaseError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn load_enabled_filters_and_orders() {
        let db = test_db().await;
        let low = db
            .insert_provider(&provider(ProviderFamily::Groq, "gemma-7b-it", 0.5))
            .await
            .unwrap();
        let high = db
            .insert_provider(&provider(ProviderFamily::OpenAi, "gpt-4", 2.0))
            .await
            .unwrap();
        db.insert_provider(&provider(ProviderFamily::Cohere, "command-r", 3.0).disabled())
            .await
            .unwrap();
        let broken = db
            .insert_provider(&provider(ProviderFamily::Qwen, "qwen2-72b", 5.0))
            .await
            .unwrap();
        db.set_provider_status(broken, ProviderStatus::Error, Some("HTTP 401"))
            .await
            .unwrap();

        let ids: Vec<i64> = db
            .load_enabled_providers()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ids, vec![high, low]);

        let listed = db.list_providers().await.unwrap();
        assert_eq!(listed.len(), 4);
        let broken_row = listed.iter().find(|p| p.config.id == broken).unwrap();
        assert_eq!(broken_row.status, ProviderStatus::Error);
        assert_eq!(broken_row.last_error.as_deref(), Some("HTTP 401"));
    }

    #[tokio::test]
    async fn stats_update_is_a_running_delta() {
        let db = test_db().await;
        let id = db
            .insert_provider(&provider(ProviderFamily::Anthropic, "claude-3-haiku-20240307", 1.0))
            .await
            .unwrap();

        db.record_stats(&update(id, true, 100, dec!(0.003))).await.unwrap();
        db.record_stats(&update(id, false, 400, dec!(0))).await.unwrap();
        db.record_stats(&update(id, true, 100, dec!(0.000015))).await.unwrap();

        let stats = db.provider_stats(id).await.unwrap();
        assert_eq!(stats.requests, 3);
        assert_eq!(stats.successes, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_cost, dec!(0.003015));
        assert!((stats.average_latency_ms - 200.0).abs() < 1e-6);
        assert!(stats.last_used.is_some());
    }

    #[tokio::test]
    async fn cumulative_cost_saturates() {
        let db = test_db().await;
        let id = db
            .insert_provider(&provider(ProviderFamily::Cohere, "command-r", 1.0))
            .await
            .unwrap();

        db.record_stats(&update(id, true, 10, Decimal::MAX)).await.unwrap();
        db.record_stats(&update(id, true, 10, dec!(5))).await.unwrap();

        let stats = db.provider_stats(id).await.unwrap();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.total_cost, cost_from_nanos(i64::MAX));
    }

    #[tokio::test]
    async fn stats_for_unknown_provider_fails() {
        let db = test_db().await;
        assert!(db.record_stats(&update(7, true, 1, dec!(0))).await.is_err());
    }

    #[tokio::test]
    async fn analysis_records_round_trip() {
        let db = test_db().await;
        let correlation_id = Uuid::new_v4();
        let record = AnalysisRecord {
            correlation_id,
            provider_id: 1,
            analysis: Analysis {
                category: Category::Finance,
                priority: Priority::High,
                sentiment: Sentiment::Negative,
                confidence: 0.91,
                summary: Some("Invoice is overdue.".into()),
                action_required: Some(true),
                suggested_actions: vec!["Pay invoice".into()],
            },
            latency_ms: 850,
            tokens_used: 312,
            cost: dec!(0.00624),
            raw_response: Some("{\"id\":\"x\"}".into()),
            created_at: Utc::now(),
        };
        db.record_analysis(&record).await.unwrap();
        db.record_analysis(&AnalysisRecord {
            correlation_id: Uuid::new_v4(),
            ..record.clone()
        })
        .await
        .unwrap();

        let records = db.analyses_for(correlation_id).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].analysis, record.analysis);
        assert_eq!(records[0].cost, dec!(0.00624));
        assert_eq!(records[0].tokens_used, 312);
    }

    #[tokio::test]
    async fn local_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ensemble.db");

        let id = {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_provider(&provider(ProviderFamily::Mistral, "mistral-small-latest", 1.0))
                .await
                .unwrap()
        };

        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert_eq!(db.get_provider(id).await.unwrap().model, "mistral-small-latest");
    }
}
