//! Reconciliation configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationConfig {
    /// Settle window after the last submission before fetching broker
    /// state, letting fills and status callbacks arrive.
    #[serde(default = "default_settle_window")]
    pub settle_window_secs: u64,
    /// Overall timeout for the broker ground-truth fetch; partial data is
    /// used when it expires.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    /// Extra broker-error-code classification rows, merged over the
    /// built-in rule table. Keyed by raw code.
    #[serde(default)]
    pub extra_error_rules: Vec<ErrorRuleRow>,
}

/// One configurable broker-error-code classification row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRuleRow {
    /// Raw broker error code.
    pub code: String,
    /// Classification tag name (matches the report classification).
    pub classification: String,
    /// Narrative template; `{symbol}` is substituted.
    pub narrative: String,
}

impl ReconciliationConfig {
    /// Settle window as a `Duration`.
    #[must_use]
    pub const fn settle_window(&self) -> Duration {
        Duration::from_secs(self.settle_window_secs)
    }

    /// Fetch timeout as a `Duration`.
    #[must_use]
    pub const fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            settle_window_secs: default_settle_window(),
            fetch_timeout_secs: default_fetch_timeout(),
            extra_error_rules: Vec::new(),
        }
    }
}

const fn default_settle_window() -> u64 {
    15
}

const fn default_fetch_timeout() -> u64 {
    30
}
