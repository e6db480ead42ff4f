//! Broker-native instruments and resolution records.

use serde::{Deserialize, Serialize};

/// An instrument as uniquely identified in the broker's catalog.
///
/// Produced by the broker's contract lookup, consumed read-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerInstrument {
    /// Broker-native contract identifier.
    pub broker_id: i64,
    /// Broker symbol (may differ from the upstream ticker).
    pub symbol: String,
    /// Primary exchange.
    pub exchange: String,
    /// Trading currency (ISO 4217).
    pub currency: String,
    /// Whether the broker accepts orders for this instrument.
    pub tradable: bool,
}

/// Strategy that produced a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    /// Exact ISIN match against the broker catalog.
    Isin,
    /// Normalized ticker variation match.
    Ticker,
    /// Name-based fuzzy symbol search.
    Name,
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Isin => write!(f, "isin"),
            Self::Ticker => write!(f, "ticker"),
            Self::Name => write!(f, "name"),
        }
    }
}

/// A candidate rejected during disambiguation, kept for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedCandidate {
    /// Broker symbol of the rejected candidate.
    pub symbol: String,
    /// Candidate exchange.
    pub exchange: String,
    /// Candidate currency.
    pub currency: String,
    /// Similarity/confidence score the candidate achieved.
    pub score: f64,
    /// Why the candidate lost (currency mismatch, lower score, ...).
    pub reason: String,
}

/// Outcome of resolving one asset against the broker catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRecord {
    /// Upstream ticker the record belongs to.
    pub ticker: String,
    /// ISIN used during resolution, when present.
    pub isin: Option<String>,
    /// Resolved instrument, `None` when no strategy cleared its threshold.
    pub instrument: Option<BrokerInstrument>,
    /// Strategy that produced the match, `None` when unresolved.
    pub method: Option<ResolutionMethod>,
    /// Confidence score of the winning match (0.0 when unresolved).
    pub confidence: f64,
    /// Candidates considered and rejected, for audit.
    pub rejected: Vec<RejectedCandidate>,
}

impl ResolutionRecord {
    /// Record for an asset no strategy could resolve.
    #[must_use]
    pub fn unresolved(ticker: impl Into<String>, isin: Option<String>) -> Self {
        Self {
            ticker: ticker.into(),
            isin,
            instrument: None,
            method: None,
            confidence: 0.0,
            rejected: Vec::new(),
        }
    }

    /// Whether the asset resolved to a broker instrument.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.instrument.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_record_has_no_instrument() {
        let record = ResolutionRecord::unresolved("ACME", None);
        assert!(!record.is_resolved());
        assert!(record.method.is_none());
        assert!((record.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn method_display_matches_serde_tag() {
        assert_eq!(ResolutionMethod::Isin.to_string(), "isin");
        assert_eq!(ResolutionMethod::Ticker.to_string(), "ticker");
        assert_eq!(ResolutionMethod::Name.to_string(), "name");
    }
}
