//! Persistence layer: providers, their running stats and audit records.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{ProviderStatus, ProviderStore, StoredProvider};

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Decimal places kept for cumulative cost.
const COST_SCALE: u32 = 9;

/// Cost as an integer count of 10⁻⁹ units, so SQL can add it atomically.
pub(crate) fn cost_to_nanos(cost: Decimal) -> i64 {
    cost.checked_mul(Decimal::from(10_i64.pow(COST_SCALE)))
        .and_then(|nanos| nanos.round().to_i64())
        .unwrap_or(i64::MAX)
}

pub(crate) fn cost_from_nanos(nanos: i64) -> Decimal {
    Decimal::new(nanos, COST_SCALE).normalize()
}
