//! Broker connection and session pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Broker connection and session pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker gateway host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Broker gateway port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client id of the first pool slot; slot `i` uses `base_client_id + i`.
    #[serde(default = "default_base_client_id")]
    pub base_client_id: i32,
    /// Number of concurrent sessions in the pool.
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Hard timeout for pool acquisition.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
    /// Per-request timeout awaiting the broker callback.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Initial reconnect backoff in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub reconnect_initial_backoff_ms: u64,
    /// Maximum reconnect backoff in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub reconnect_max_backoff_ms: u64,
    /// Maximum reconnect attempts before a session is abandoned.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Path to a simulated venue catalog JSON. When set the engine runs
    /// against the in-memory venue instead of a live gateway.
    #[serde(default)]
    pub paper_catalog: Option<String>,
}

impl BrokerConfig {
    /// Pool acquisition timeout as a `Duration`.
    #[must_use]
    pub const fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    /// Per-request timeout as a `Duration`.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Initial reconnect backoff as a `Duration`.
    #[must_use]
    pub const fn reconnect_initial_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_backoff_ms)
    }

    /// Maximum reconnect backoff as a `Duration`.
    #[must_use]
    pub const fn reconnect_max_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_backoff_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            base_client_id: default_base_client_id(),
            pool_size: default_pool_size(),
            acquire_timeout_secs: default_acquire_timeout(),
            request_timeout_secs: default_request_timeout(),
            reconnect_initial_backoff_ms: default_initial_backoff_ms(),
            reconnect_max_backoff_ms: default_max_backoff_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            paper_catalog: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    7497
}

const fn default_base_client_id() -> i32 {
    100
}

const fn default_pool_size() -> usize {
    5
}

const fn default_acquire_timeout() -> u64 {
    5
}

const fn default_request_timeout() -> u64 {
    4
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

const fn default_max_reconnect_attempts() -> u32 {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BrokerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 7497);
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), Duration::from_secs(4));
    }
}
