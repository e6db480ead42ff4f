//! Configuration module for the rebalance engine.
//!
//! Provides YAML configuration loading with environment variable
//! interpolation and a validation pass over all component sections.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rebalance_engine::config::load_config;
//!
//! // Load from default path (config.yaml)
//! let config = load_config(None)?;
//!
//! // Access configuration values
//! println!("pool size: {}", config.broker.pool_size);
//! ```

mod artifacts;
mod broker;
mod reconciliation;
mod resolution;
mod submission;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use artifacts::ArtifactsConfig;
pub use broker::BrokerConfig;
pub use reconciliation::{ErrorRuleRow, ReconciliationConfig};
pub use resolution::ResolutionConfig;
pub use submission::SubmissionConfig;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        /// Path to the config file.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// Failed to parse YAML configuration.
    #[error("Failed to parse config YAML: {0}")]
    ParseError(#[from] serde_yaml_bw::Error),

    /// Configuration validation failed.
    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Broker connection and session pool configuration.
    #[serde(default)]
    pub broker: BrokerConfig,
    /// Instrument resolution configuration.
    #[serde(default)]
    pub resolution: ResolutionConfig,
    /// Order submission configuration.
    #[serde(default)]
    pub submission: SubmissionConfig,
    /// Reconciliation configuration.
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    /// Run artifact output configuration.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    /// Default log level when RUST_LOG is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: BrokerConfig::default(),
            resolution: ResolutionConfig::default(),
            submission: SubmissionConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            artifacts: ArtifactsConfig::default(),
            log_level: default_log_level(),
        }
    }
}

/// Load configuration from a YAML file with environment variable interpolation.
///
/// # Arguments
///
/// * `path` - Optional path to the config file. Defaults to "config.yaml".
///
/// # Errors
///
/// Returns a `ConfigError` if the file cannot be read, parsed, or validated.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or("config.yaml");

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_string(),
        source: e,
    })?;

    load_config_from_string(&contents)
}

/// Load configuration from a YAML string (useful for testing).
///
/// # Errors
///
/// Returns a `ConfigError` if the YAML cannot be parsed or validated.
pub fn load_config_from_string(yaml: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(yaml);
    let config: Config = serde_yaml_bw::from_str(&interpolated)?;
    validate_config(&config)?;
    Ok(config)
}

/// Interpolate environment variables in a string.
///
/// Supports both `${VAR}` and `${VAR:-default}` syntax.
#[allow(clippy::expect_used)] // Regex is compile-time constant; expect() is safe here
fn interpolate_env_vars(input: &str) -> String {
    use std::sync::OnceLock;

    static ENV_VAR_REGEX: OnceLock<regex::Regex> = OnceLock::new();

    let mut result = input.to_string();

    let re = ENV_VAR_REGEX.get_or_init(|| {
        regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}")
            .expect("env var regex is valid")
    });

    for cap in re.captures_iter(input) {
        let Some(full_match) = cap.get(0) else {
            continue;
        };
        let Some(var_match) = cap.get(1) else {
            continue;
        };
        let full_match = full_match.as_str();
        let var_name = var_match.as_str();
        let default_value = cap.get(2).map(|m| m.as_str());

        let value = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => v,
            _ => default_value.map_or_else(String::new, str::to_string),
        };

        result = result.replace(full_match, &value);
    }

    result
}

/// Validate configuration values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.broker.pool_size == 0 {
        return Err(ConfigError::ValidationError(
            "broker.pool_size must be at least 1".to_string(),
        ));
    }

    if config.resolution.max_concurrency == 0 {
        return Err(ConfigError::ValidationError(
            "resolution.max_concurrency must be at least 1".to_string(),
        ));
    }

    if config.resolution.max_concurrency > config.broker.pool_size {
        return Err(ConfigError::ValidationError(format!(
            "resolution.max_concurrency ({}) must not exceed broker.pool_size ({})",
            config.resolution.max_concurrency, config.broker.pool_size
        )));
    }

    for (label, threshold) in [
        ("isin_threshold", config.resolution.isin_threshold),
        ("ticker_threshold", config.resolution.ticker_threshold),
        ("name_threshold", config.resolution.name_threshold),
    ] {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ValidationError(format!(
                "resolution.{label} must be between 0.0 and 1.0"
            )));
        }
    }

    if config.resolution.name_threshold <= config.resolution.noise_floor {
        return Err(ConfigError::ValidationError(
            "resolution.name_threshold must be above resolution.noise_floor".to_string(),
        ));
    }

    if config.reconciliation.settle_window_secs == 0 {
        return Err(ConfigError::ValidationError(
            "reconciliation.settle_window_secs must be at least 1".to_string(),
        ));
    }

    for rule in &config.reconciliation.extra_error_rules {
        if rule.classification.parse::<crate::reconcile::Classification>().is_err() {
            tracing::warn!(
                code = %rule.code,
                classification = %rule.classification,
                "extra error rule has an unknown classification and will be ignored"
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.broker.pool_size, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn load_minimal_config() {
        let yaml = r"
broker:
  pool_size: 3
";
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load minimal config: {e}"),
        };
        assert_eq!(config.broker.pool_size, 3);
        // Untouched sections keep their defaults
        assert!((config.resolution.isin_threshold - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn env_var_with_default_when_missing() {
        let input = "host: ${REBALANCE_TEST_NONEXISTENT_VAR:-127.0.0.1}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "host: 127.0.0.1");
    }

    #[test]
    fn env_var_without_default_becomes_empty() {
        let input = "api_key: ${REBALANCE_TEST_UNLIKELY_TO_EXIST}";
        let result = interpolate_env_vars(input);
        assert_eq!(result, "api_key: ");
    }

    #[test]
    fn validation_zero_pool_size() {
        let yaml = r"
broker:
  pool_size: 0
";
        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for zero pool size");
        };
        assert!(err.to_string().contains("pool_size"));
    }

    #[test]
    fn validation_concurrency_exceeds_pool() {
        let yaml = r"
broker:
  pool_size: 2
resolution:
  max_concurrency: 8
";
        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for concurrency above pool size");
        };
        assert!(err.to_string().contains("max_concurrency"));
    }

    #[test]
    fn validation_threshold_out_of_range() {
        let yaml = r"
resolution:
  ticker_threshold: 1.5
";
        let result = load_config_from_string(yaml);
        let Err(err) = result else {
            panic!("expected error for out-of-range threshold");
        };
        assert!(err.to_string().contains("ticker_threshold"));
    }

    #[test]
    fn full_config_parse() {
        let yaml = r#"
broker:
  host: "127.0.0.1"
  port: 7496
  base_client_id: 10
  pool_size: 4
  acquire_timeout_secs: 5
  request_timeout_secs: 4

resolution:
  isin_threshold: 1.0
  ticker_threshold: 0.9
  name_threshold: 0.8
  max_concurrency: 4
  cache_ttl_secs: 86400
  cache_path: "cache/resolution.json"

submission:
  pacing_delay_ms: 500
  local_currency: "EUR"

reconciliation:
  settle_window_secs: 15
  fetch_timeout_secs: 30

artifacts:
  output_dir: "runs"

log_level: "debug"
"#;
        let config = match load_config_from_string(yaml) {
            Ok(c) => c,
            Err(e) => panic!("should load full config: {e}"),
        };

        assert_eq!(config.broker.port, 7496);
        assert_eq!(config.broker.pool_size, 4);
        assert!((config.resolution.ticker_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.resolution.cache_path.as_deref(), Some("cache/resolution.json"));
        assert_eq!(config.submission.pacing_delay_ms, 500);
        assert_eq!(config.submission.local_currency, "EUR");
        assert_eq!(config.reconciliation.settle_window_secs, 15);
        assert_eq!(config.artifacts.output_dir, "runs");
        assert_eq!(config.log_level, "debug");
    }
}
