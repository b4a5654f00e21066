//! Error types for the email ensemble.
//!
//! Two severities are kept apart:
//! a [`ProviderFailure`] belongs to one provider inside one round and is
//! absorbed into that provider's result, while a [`RoundError`] is fatal to
//! a single analysis request and is the only thing surfaced to callers.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Round error: {0}")]
    Round(#[from] RoundError),

    #[error("Consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("Intake error: {0}")]
    Intake(String),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown provider family: {0}")]
    UnknownFamily(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Translation errors between canonical shapes and a provider wire format.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Invalid endpoint for {provider}: {reason}")]
    InvalidEndpoint { provider: String, reason: String },

    #[error("Invalid header {name} for {provider}")]
    InvalidHeader { provider: String, name: String },

    #[error("Response envelope from {provider} has no content at {path}")]
    MissingContent { provider: String, path: String },
}

/// Hard rejection of a provider's free-text reply.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid JSON: {0}")]
    Json(String),

    #[error("Reply is not a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Why a single provider did not contribute to a round.
///
/// Never fatal on its own: the dispatcher records it on the provider's
/// result and moves on.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled after {0:?}")]
    Cancelled(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("malformed response envelope: {0}")]
    Envelope(String),

    #[error("invalid analysis: {0}")]
    Validation(#[from] ValidationError),
}

impl ProviderFailure {
    /// Short label for logging and stats.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Cancelled(_) => "cancelled",
            Self::Transport(_) => "transport",
            Self::HttpStatus { .. } => "http_status",
            Self::Envelope(_) => "envelope",
            Self::Validation(_) => "validation",
        }
    }
}

/// A provider that failed during a round, with its reason.
#[derive(Debug, Clone)]
pub struct FailedProvider {
    pub provider_id: i64,
    pub provider: String,
    pub model: String,
    pub failure: ProviderFailure,
}

impl std::fmt::Display for FailedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}: {}", self.provider, self.model, self.failure)
    }
}

/// Errors that fail a whole analysis request.
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error("No AI providers are enabled")]
    NoProviders,

    #[error("All {} AI providers failed for request {correlation_id}: {}", .failures.len(), join_failures(.failures))]
    AllProvidersFailed {
        correlation_id: Uuid,
        failures: Vec<FailedProvider>,
    },

    #[error("Round cancelled for request {0}")]
    Cancelled(Uuid),

    #[error("Provider translation failed before dispatch: {0}")]
    Config(#[from] AdapterError),
}

fn join_failures(failures: &[FailedProvider]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Consensus errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("No results to calculate consensus from")]
    NoResults,
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
