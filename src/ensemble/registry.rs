//! The set of providers eligible for a round.

use tracing::debug;

use crate::error::ConfigError;
use crate::llm::ProviderConfig;
use crate::store::ProviderStore;

/// Enabled, validated providers in descending priority-weight order.
///
/// Iteration order is also the consensus tie-break order.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl ProviderRegistry {
    /// Validate every config, drop disabled ones, and order by weight.
    ///
    /// Providers of equal weight keep their input order.
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, ConfigError> {
        for config in &configs {
            config.validate()?;
        }

        let mut providers: Vec<ProviderConfig> =
            configs.into_iter().filter(|c| c.enabled).collect();
        providers.sort_by(|a, b| b.priority_weight.total_cmp(&a.priority_weight));

        debug!(count = providers.len(), "Provider registry built");
        Ok(Self { providers })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Load the enabled, active providers from a store.
    pub async fn from_store(store: &dyn ProviderStore) -> Result<Self, crate::Error> {
        let configs = store.load_enabled_providers().await?;
        Ok(Self::new(configs)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderFamily;

    fn provider(id: i64, weight: f64) -> ProviderConfig {
        ProviderConfig::new(ProviderFamily::OpenAi, format!("m{id}"), "k")
            .with_id(id)
            .with_weight(weight)
    }

    #[test]
    fn orders_by_descending_weight_stably() {
        let registry = ProviderRegistry::new(vec![
            provider(1, 1.0),
            provider(2, 3.0),
            provider(3, 1.0),
            provider(4, 2.5),
        ])
        .unwrap();
        let ids: Vec<i64> = registry.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![2, 4, 1, 3]);
    }

    #[test]
    fn drops_disabled_providers() {
        let registry =
            ProviderRegistry::new(vec![provider(1, 1.0), provider(2, 2.0).disabled()]).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(2).is_none());
        assert_eq!(registry.get(1).unwrap().model, "m1");
    }

    #[test]
    fn invalid_config_fails_fast() {
        let err = ProviderRegistry::new(vec![provider(1, 1.0), provider(2, -1.0)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn empty_registry() {
        assert!(ProviderRegistry::empty().is_empty());
        assert!(ProviderRegistry::new(vec![]).unwrap().is_empty());
    }
}
