//! Instrument resolution configuration.
//!
//! Similarity thresholds are empirically tuned, not derived; treat the
//! defaults as a starting point and validate against a labeled sample
//! before relying on fully automated name-based resolution.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Instrument resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionConfig {
    /// Confidence required for an ISIN exact match.
    #[serde(default = "default_isin_threshold")]
    pub isin_threshold: f64,
    /// Confidence required for a ticker-variation match.
    #[serde(default = "default_ticker_threshold")]
    pub ticker_threshold: f64,
    /// Similarity required for a name-based fuzzy match. Stricter than the
    /// ticker threshold because name search casts a wider net.
    #[serde(default = "default_name_threshold")]
    pub name_threshold: f64,
    /// Candidates scoring below this are not even recorded as rejected.
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f64,
    /// Concurrent asset resolutions; must not exceed the pool size.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-strategy timeout in seconds before the next strategy is tried.
    #[serde(default = "default_strategy_timeout")]
    pub strategy_timeout_secs: u64,
    /// Cache entry TTL in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Optional path for persisting the cache across runs.
    #[serde(default)]
    pub cache_path: Option<String>,
}

impl ResolutionConfig {
    /// Per-strategy timeout as a `Duration`.
    #[must_use]
    pub const fn strategy_timeout(&self) -> Duration {
        Duration::from_secs(self.strategy_timeout_secs)
    }

    /// Cache TTL as a `Duration`.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            isin_threshold: default_isin_threshold(),
            ticker_threshold: default_ticker_threshold(),
            name_threshold: default_name_threshold(),
            noise_floor: default_noise_floor(),
            max_concurrency: default_max_concurrency(),
            strategy_timeout_secs: default_strategy_timeout(),
            cache_ttl_secs: default_cache_ttl(),
            cache_path: None,
        }
    }
}

const fn default_isin_threshold() -> f64 {
    1.0
}

const fn default_ticker_threshold() -> f64 {
    0.85
}

const fn default_name_threshold() -> f64 {
    0.72
}

const fn default_noise_floor() -> f64 {
    0.30
}

const fn default_max_concurrency() -> usize {
    5
}

const fn default_strategy_timeout() -> u64 {
    4
}

const fn default_cache_ttl() -> u64 {
    86_400 // one day
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ResolutionConfig::default();
        assert!((config.isin_threshold - 1.0).abs() < f64::EPSILON);
        assert!(config.name_threshold < config.ticker_threshold);
        assert!(config.noise_floor < config.name_threshold);
        assert_eq!(config.cache_ttl(), Duration::from_secs(86_400));
        assert!(config.cache_path.is_none());
    }
}
