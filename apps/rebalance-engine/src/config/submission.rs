//! Order submission configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Order submission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionConfig {
    /// Delay between consecutive submissions, respecting broker throughput
    /// limits.
    #[serde(default = "default_pacing_delay_ms")]
    pub pacing_delay_ms: u64,
    /// Currency of the account's home market; instruments in this currency
    /// trade in the local session.
    #[serde(default = "default_local_currency")]
    pub local_currency: String,
}

impl SubmissionConfig {
    /// Pacing delay as a `Duration`.
    #[must_use]
    pub const fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            pacing_delay_ms: default_pacing_delay_ms(),
            local_currency: default_local_currency(),
        }
    }
}

const fn default_pacing_delay_ms() -> u64 {
    250
}

fn default_local_currency() -> String {
    "USD".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SubmissionConfig::default();
        assert_eq!(config.pacing_delay(), Duration::from_millis(250));
        assert_eq!(config.local_currency, "USD");
    }
}
