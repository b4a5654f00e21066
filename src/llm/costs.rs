//! Per-token pricing used to estimate what each provider call cost.
//!
//! Rates are configuration, not truth: the defaults are flat placeholder
//! figures per family, and deployments override them per family or per
//! model id.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::ProviderFamily;

/// Rate applied when neither the model nor the family has an entry.
const FALLBACK_RATE: Decimal = dec!(0.00001);

/// Pluggable cost table: model rate, then family rate, then fallback.
#[derive(Debug, Clone)]
pub struct CostTable {
    family_rates: HashMap<ProviderFamily, Decimal>,
    model_rates: HashMap<String, Decimal>,
    fallback: Decimal,
}

impl Default for CostTable {
    fn default() -> Self {
        let family_rates = HashMap::from([
            (ProviderFamily::OpenAi, dec!(0.00002)),
            (ProviderFamily::Anthropic, dec!(0.00003)),
            (ProviderFamily::Google, dec!(0.000001)),
            (ProviderFamily::Qwen, dec!(0.000001)),
            (ProviderFamily::Groq, dec!(0.000001)),
            (ProviderFamily::Cohere, dec!(0.00001)),
            (ProviderFamily::Mistral, dec!(0.00002)),
            (ProviderFamily::Together, dec!(0.000001)),
        ]);
        Self {
            family_rates,
            model_rates: HashMap::new(),
            fallback: FALLBACK_RATE,
        }
    }
}

impl CostTable {
    /// A table with no rates at all: every call costs zero.
    pub fn free() -> Self {
        Self {
            family_rates: HashMap::new(),
            model_rates: HashMap::new(),
            fallback: Decimal::ZERO,
        }
    }

    pub fn with_family_rate(mut self, family: ProviderFamily, rate: Decimal) -> Self {
        self.family_rates.insert(family, rate);
        self
    }

    pub fn with_model_rate(mut self, model: impl Into<String>, rate: Decimal) -> Self {
        self.model_rates.insert(model.into(), rate);
        self
    }

    pub fn with_fallback(mut self, rate: Decimal) -> Self {
        self.fallback = rate;
        self
    }

    /// Per-token rate for a provider call.
    pub fn rate_for(&self, family: ProviderFamily, model: &str) -> Decimal {
        self.model_rates
            .get(model)
            .or_else(|| self.family_rates.get(&family))
            .copied()
            .unwrap_or(self.fallback)
    }

    /// Estimated cost of `tokens` tokens, saturating at `Decimal::MAX`.
    pub fn cost(&self, family: ProviderFamily, model: &str, tokens: u64) -> Decimal {
        self.rate_for(family, model)
            .checked_mul(Decimal::from(tokens))
            .unwrap_or(Decimal::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates_per_family() {
        let table = CostTable::default();
        assert_eq!(table.cost(ProviderFamily::OpenAi, "gpt-4", 1000), dec!(0.02));
        assert_eq!(
            table.cost(ProviderFamily::Anthropic, "claude-3-opus-20240229", 1000),
            dec!(0.03)
        );
        assert_eq!(table.cost(ProviderFamily::Groq, "x", 0), Decimal::ZERO);
    }

    #[test]
    fn model_rate_beats_family_rate() {
        let table = CostTable::default().with_model_rate("gpt-3.5-turbo", dec!(0.000002));
        assert_eq!(table.rate_for(ProviderFamily::OpenAi, "gpt-3.5-turbo"), dec!(0.000002));
        assert_eq!(table.rate_for(ProviderFamily::OpenAi, "gpt-4"), dec!(0.00002));
    }

    #[test]
    fn cost_saturates_instead_of_overflowing() {
        let table = CostTable::free().with_fallback(Decimal::MAX);
        assert_eq!(table.cost(ProviderFamily::Qwen, "qwen2-72b", u64::MAX), Decimal::MAX);
    }

    #[test]
    fn free_table_uses_fallback() {
        let table = CostTable::free().with_fallback(dec!(0.5));
        assert_eq!(table.cost(ProviderFamily::Cohere, "command-r", 4), dec!(2.0));
    }
}
