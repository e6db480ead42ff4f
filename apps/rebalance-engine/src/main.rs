//! Rebalance Engine Binary
//!
//! Runs one rebalance pass: resolve the universe, diff against live
//! positions, submit the orders, and reconcile the outcome.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin rebalance-engine -- [config.yaml]
//! ```
//!
//! # Environment Variables
//!
//! - `REBALANCE_CONFIG`: Config file path (overridden by the argument)
//! - `RUST_LOG`: Log level (default: the config's `log_level`)

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::info;

use rebalance_engine::broker::{Connector, SimulatedBroker};
use rebalance_engine::config::load_config;
use rebalance_engine::models::{Asset, TargetAllocation};
use rebalance_engine::telemetry::init_telemetry;
use rebalance_engine::RebalanceEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let arg = std::env::args().nth(1);
    let env_path = std::env::var("REBALANCE_CONFIG").ok();
    let config_path = arg.or(env_path);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    init_telemetry(&config.log_level);

    let assets: Vec<Asset> = read_json(&config.artifacts.assets_path)
        .with_context(|| format!("reading asset universe {}", config.artifacts.assets_path))?;
    let target_map: BTreeMap<String, i64> = read_json(&config.artifacts.targets_path)
        .with_context(|| format!("reading targets {}", config.artifacts.targets_path))?;
    let targets: TargetAllocation = target_map.into_iter().collect();
    info!(
        assets = assets.len(),
        targets = targets.len(),
        "inputs loaded"
    );

    let connector: Arc<dyn Connector> = match config.broker.paper_catalog.as_deref() {
        Some(path) => {
            info!(catalog = path, "running against the simulated venue");
            Arc::new(
                SimulatedBroker::from_catalog_file(Path::new(path))
                    .with_context(|| format!("loading venue catalog {path}"))?,
            )
        }
        None => bail!("no transport configured; set broker.paper_catalog"),
    };

    let engine = RebalanceEngine::connect(config, connector)
        .await
        .context("connecting to the broker")?;
    let outcome = engine.run(&assets, &targets).await.context("rebalance run")?;

    info!(
        run_id = %outcome.run_id,
        resolved = outcome.resolved,
        universe = outcome.universe,
        orders = outcome.orders,
        success_rate = outcome.report.success_rate,
        artifacts = %outcome.artifact_dir.display(),
        "run complete"
    );
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &str) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}
