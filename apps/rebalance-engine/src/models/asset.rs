//! Assets as known to the upstream data source, and target allocations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// An instrument as identified by the upstream screener universe.
///
/// Immutable once received; the engine never mutates upstream identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Upstream ticker symbol.
    pub ticker: String,
    /// ISIN, when the upstream source provides one.
    pub isin: Option<String>,
    /// Full instrument name.
    pub name: String,
    /// Trading currency (ISO 4217).
    pub currency: String,
    /// Country of listing (ISO 3166 alpha-2).
    pub country: String,
}

impl Asset {
    /// Cache key for this asset: (ticker, isin).
    #[must_use]
    pub fn cache_key(&self) -> (String, Option<String>) {
        (self.ticker.clone(), self.isin.clone())
    }
}

/// Target share quantities per upstream ticker.
///
/// Quantities are already lot-size rounded upstream; this engine never
/// adjusts them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetAllocation {
    /// Ticker to target share quantity.
    targets: BTreeMap<String, i64>,
}

impl TargetAllocation {
    /// Create an empty allocation.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target quantity for a ticker.
    pub fn set(&mut self, ticker: impl Into<String>, quantity: i64) {
        self.targets.insert(ticker.into(), quantity);
    }

    /// Target quantity for a ticker, zero when absent.
    #[must_use]
    pub fn quantity(&self, ticker: &str) -> i64 {
        self.targets.get(ticker).copied().unwrap_or(0)
    }

    /// Iterate (ticker, quantity) pairs in ticker order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.targets.iter().map(|(t, q)| (t.as_str(), *q))
    }

    /// Number of tickers with a target.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the allocation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl FromIterator<(String, i64)> for TargetAllocation {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        Self {
            targets: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> Asset {
        Asset {
            ticker: "ACME".to_string(),
            isin: Some("US0001".to_string()),
            name: "Acme Corp".to_string(),
            currency: "USD".to_string(),
            country: "US".to_string(),
        }
    }

    #[test]
    fn cache_key_includes_isin() {
        let asset = acme();
        assert_eq!(
            asset.cache_key(),
            ("ACME".to_string(), Some("US0001".to_string()))
        );
    }

    #[test]
    fn missing_ticker_has_zero_target() {
        let mut allocation = TargetAllocation::new();
        allocation.set("ACME", 100);

        assert_eq!(allocation.quantity("ACME"), 100);
        assert_eq!(allocation.quantity("BETA"), 0);
    }

    #[test]
    fn iteration_is_ordered_by_ticker() {
        let allocation: TargetAllocation =
            [("ZETA".to_string(), 5), ("ACME".to_string(), 10)]
                .into_iter()
                .collect();

        let tickers: Vec<&str> = allocation.iter().map(|(t, _)| t).collect();
        assert_eq!(tickers, vec!["ACME", "ZETA"]);
    }
}
