//! Live position snapshot pulled from the broker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Broker positions at a point in time.
///
/// Always pulled live per run, never cached beyond one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Broker symbol to held share quantity.
    positions: HashMap<String, i64>,
    /// When the snapshot was pulled (RFC 3339).
    pub fetched_at: String,
}

impl PositionSnapshot {
    /// Build a snapshot from broker-reported positions.
    #[must_use]
    pub fn new(positions: HashMap<String, i64>, fetched_at: String) -> Self {
        Self {
            positions,
            fetched_at,
        }
    }

    /// Held quantity for a symbol, zero when flat.
    #[must_use]
    pub fn quantity(&self, symbol: &str) -> i64 {
        self.positions.get(symbol).copied().unwrap_or(0)
    }

    /// Number of non-flat positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether the account holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Iterate (symbol, quantity) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.positions.iter().map(|(s, q)| (s.as_str(), *q))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_symbol_has_zero_quantity() {
        let snapshot = PositionSnapshot::new(
            HashMap::from([("ACME".to_string(), 40)]),
            "2026-01-01T00:00:00Z".to_string(),
        );

        assert_eq!(snapshot.quantity("ACME"), 40);
        assert_eq!(snapshot.quantity("BETA"), 0);
        assert_eq!(snapshot.len(), 1);
    }
}
