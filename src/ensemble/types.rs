//! Shared types for an analysis round.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{FailedProvider, ProviderFailure};
use crate::llm::{ProviderConfig, ProviderFamily};

/// Maximum number of body characters sent to providers.
pub const BODY_EXCERPT_LIMIT: usize = 2000;

// ── Request ─────────────────────────────────────────────────────────

/// One email to analyze. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    correlation_id: Uuid,
    subject: Option<String>,
    sender: String,
    body_excerpt: String,
}

impl AnalysisRequest {
    /// Build a request with a fresh correlation id, truncating the body.
    pub fn new(subject: Option<String>, sender: impl Into<String>, body: &str) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            subject: subject.filter(|s| !s.trim().is_empty()),
            sender: sender.into(),
            body_excerpt: body.chars().take(BODY_EXCERPT_LIMIT).collect(),
        }
    }

    /// Replace the generated correlation id (e.g. with the caller's email id).
    pub fn with_correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = id;
        self
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn body_excerpt(&self) -> &str {
        &self.body_excerpt
    }
}

// ── Closed label sets ───────────────────────────────────────────────

/// Email category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Personal,
    Marketing,
    Finance,
    Travel,
    Shopping,
    Social,
    Spam,
    Important,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Self::Work,
        Self::Personal,
        Self::Marketing,
        Self::Finance,
        Self::Travel,
        Self::Shopping,
        Self::Social,
        Self::Spam,
        Self::Important,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Marketing => "marketing",
            Self::Finance => "finance",
            Self::Travel => "travel",
            Self::Shopping => "shopping",
            Self::Social => "social",
            Self::Spam => "spam",
            Self::Important => "important",
        }
    }

    /// Parse a label, ignoring case and surrounding whitespace.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

/// Email priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Self::High, Self::Medium, Self::Low];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(label))
    }
}

/// Email sentiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub const ALL: [Sentiment; 3] = [Self::Positive, Self::Neutral, Self::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(label))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Analysis ────────────────────────────────────────────────────────

/// A validated decision about one email.
///
/// The four required fields are always populated; there is no partially
/// filled `Analysis`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub category: Category,
    pub priority: Priority,
    pub sentiment: Sentiment,
    /// In `[0.0, 1.0]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_required: Option<bool>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

// ── Provider result ─────────────────────────────────────────────────

/// What one provider produced for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResult {
    pub provider_id: i64,
    pub family: ProviderFamily,
    pub model: String,
    pub priority_weight: f64,
    /// The validated analysis, or why this provider was excluded.
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<Analysis, ProviderFailure>,
    #[serde(rename = "latency_ms", serialize_with = "serialize_millis")]
    pub latency: Duration,
    pub tokens_used: u64,
    pub cost: Decimal,
    pub response_bytes: usize,
    /// Raw response body, kept for audit records.
    #[serde(skip)]
    pub raw_response: Option<String>,
}

impl ProviderResult {
    /// A result with no response at all (timeout, transport error).
    pub fn failed(config: &ProviderConfig, failure: ProviderFailure, latency: Duration) -> Self {
        Self {
            provider_id: config.id,
            family: config.family,
            model: config.model.clone(),
            priority_weight: config.priority_weight,
            outcome: Err(failure),
            latency,
            tokens_used: 0,
            cost: Decimal::ZERO,
            response_bytes: 0,
            raw_response: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.outcome.as_ref().ok()
    }

    pub fn failure(&self) -> Option<&ProviderFailure> {
        self.outcome.as_ref().err()
    }

    /// `family/model` label for logs.
    pub fn label(&self) -> String {
        format!("{}/{}", self.family, self.model)
    }

    /// Convert into a round-failure entry, if this provider failed.
    pub fn as_failed_provider(&self) -> Option<FailedProvider> {
        self.failure().map(|failure| FailedProvider {
            provider_id: self.provider_id,
            provider: self.family.to_string(),
            model: self.model.clone(),
            failure: failure.clone(),
        })
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

fn serialize_outcome<S: Serializer>(
    outcome: &Result<Analysis, ProviderFailure>,
    s: S,
) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    #[serde(tag = "status", rename_all = "snake_case")]
    enum Outcome<'a> {
        Success { analysis: &'a Analysis },
        Failed { kind: &'static str, reason: String },
    }

    match outcome {
        Ok(analysis) => Outcome::Success { analysis }.serialize(s),
        Err(failure) => Outcome::Failed {
            kind: failure.label(),
            reason: failure.to_string(),
        }
        .serialize(s),
    }
}

// ── Consensus result ────────────────────────────────────────────────

/// The fused decision for one request.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    pub correlation_id: Uuid,
    /// Fused analysis; `summary` is always populated.
    pub analysis: Analysis,
    pub providers_used: usize,
    /// Every provider whose analysis was counted.
    pub contributions: Vec<ProviderResult>,
    /// Providers attempted in the same round that did not contribute.
    pub excluded: Vec<ProviderResult>,
}

impl ConsensusResult {
    /// Aggregate confidence across contributors.
    pub fn confidence(&self) -> f64 {
        self.analysis.confidence
    }

    /// Summed estimated cost of every attempted provider.
    pub fn total_cost(&self) -> Decimal {
        self.contributions
            .iter()
            .chain(self.excluded.iter())
            .fold(Decimal::ZERO, |total, r| total.saturating_add(r.cost))
    }
}
