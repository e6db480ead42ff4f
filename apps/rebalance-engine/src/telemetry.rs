//! Tracing setup.
//!
//! Console-only structured logging via `tracing-subscriber`. The filter is
//! taken from `RUST_LOG` when set, otherwise from the configured level.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `default_level` is used when `RUST_LOG` is not set (e.g. "info",
/// "rebalance_engine=debug"). Safe to call once per process; subsequent
/// calls are ignored.
pub fn init_telemetry(default_level: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init();
}
