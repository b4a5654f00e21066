//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;

use crate::ensemble::DEFAULT_TIMEOUT;
use crate::error::ConfigError;
use crate::llm::{CostTable, ProviderConfig};

/// Runtime settings for the ensemble binary.
#[derive(Debug, Clone)]
pub struct EnsembleConfig {
    /// Per-provider request timeout.
    pub timeout: Duration,
    /// libSQL database file.
    pub db_path: PathBuf,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Per-token rate for providers without a family or model rate.
    pub fallback_rate: Option<Decimal>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            db_path: PathBuf::from("./data/email-ensemble.db"),
            log_dir: None,
            fallback_rate: None,
        }
    }
}

impl EnsembleConfig {
    /// Read settings from `EMAIL_ENSEMBLE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("EMAIL_ENSEMBLE_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "EMAIL_ENSEMBLE_TIMEOUT_SECS".into(),
                    message: format!("expected a positive number of seconds, got {raw:?}"),
                })?;
            config.timeout = Duration::from_secs(secs);
        }

        if let Some(path) = lookup("EMAIL_ENSEMBLE_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }

        config.log_dir = lookup("EMAIL_ENSEMBLE_LOG_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        if let Some(raw) = lookup("EMAIL_ENSEMBLE_FALLBACK_RATE") {
            let rate: Decimal = raw
                .trim()
                .parse()
                .ok()
                .filter(|r: &Decimal| !r.is_sign_negative())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "EMAIL_ENSEMBLE_FALLBACK_RATE".into(),
                    message: format!("expected a non-negative decimal, got {raw:?}"),
                })?;
            config.fallback_rate = Some(rate);
        }

        Ok(config)
    }

    /// Default cost table with this config's overrides applied.
    pub fn cost_table(&self) -> CostTable {
        match self.fallback_rate {
            Some(rate) => CostTable::default().with_fallback(rate),
            None => CostTable::default(),
        }
    }
}

/// Read provider definitions from a JSON array file.
pub fn load_provider_file(path: &Path) -> Result<Vec<ProviderConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path)?;
    let providers: Vec<ProviderConfig> = serde_json::from_str(&raw)
        .map_err(|e| ConfigError::ParseError(format!("{}: {e}", path.display())))?;
    for provider in &providers {
        provider.validate()?;
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use rust_decimal_macros::dec;

    use super::*;
    use crate::llm::ProviderFamily;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        let config = EnsembleConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.log_dir.is_none());
        assert!(config.fallback_rate.is_none());
    }

    #[test]
    fn env_overrides() {
        let config = EnsembleConfig::from_lookup(lookup(&[
            ("EMAIL_ENSEMBLE_TIMEOUT_SECS", "5"),
            ("EMAIL_ENSEMBLE_DB_PATH", "/tmp/e.db"),
            ("EMAIL_ENSEMBLE_LOG_DIR", "/var/log/ensemble"),
            ("EMAIL_ENSEMBLE_FALLBACK_RATE", "0.0005"),
        ]))
        .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.db_path, PathBuf::from("/tmp/e.db"));
        assert_eq!(config.log_dir, Some(PathBuf::from("/var/log/ensemble")));
        assert_eq!(
            config
                .cost_table()
                .rate_for(ProviderFamily::OpenAi, "unknown-model"),
            dec!(0.00002)
        );
        assert_eq!(config.fallback_rate, Some(dec!(0.0005)));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        for bad in ["0", "-3", "soon"] {
            let err =
                EnsembleConfig::from_lookup(lookup(&[("EMAIL_ENSEMBLE_TIMEOUT_SECS", bad)]))
                    .unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }));
        }
    }

    #[test]
    fn provider_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"family": "openai", "model": "gpt-4", "api_key": "sk-1", "priority_weight": 2.0}},
                {{"family": "google", "model": "gemini-pro", "api_key": "g-1"}}
            ]"#
        )
        .unwrap();
        let providers = load_provider_file(file.path()).unwrap();
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[1].family, ProviderFamily::Google);

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(
            bad,
            r#"[{{"family": "openai", "model": "gpt-4", "api_key": "k", "temperature": 3.5}}]"#
        )
        .unwrap();
        assert!(load_provider_file(bad.path()).is_err());

        let mut unknown = tempfile::NamedTempFile::new().unwrap();
        write!(unknown, r#"[{{"family": "bard", "model": "x", "api_key": "k"}}]"#).unwrap();
        assert!(matches!(
            load_provider_file(unknown.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
