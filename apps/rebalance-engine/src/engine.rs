//! Run orchestration: resolve, diff, submit, settle, reconcile, persist.
//!
//! One `run` call is one rebalance pass. Each pass gets a UUID run id and
//! writes three artifacts under `<output_dir>/<run_id>/`: the resolution
//! outcome, the order plan, and the reconciliation report. Artifacts are
//! written as each stage completes so a crash mid-run still leaves the
//! earlier evidence on disk.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{Connector, SessionPool};
use crate::config::Config;
use crate::diff::{build_order_plan, OrderPlan};
use crate::error::EngineError;
use crate::models::{Asset, PositionSnapshot, ResolutionRecord, TargetAllocation};
use crate::reconcile::{ReconciliationEngine, ReconciliationReport};
use crate::resolution::{InstrumentResolver, ResolutionCache};
use crate::submit::ExecutionSubmitter;

/// Resolution artifact: every record plus cache counters for the run.
#[derive(Debug, Serialize)]
struct ResolutionArtifact<'a> {
    run_id: &'a str,
    started_at: &'a str,
    records: &'a [ResolutionRecord],
    cache: crate::resolution::CacheStats,
}

/// Summary of one completed rebalance pass.
#[derive(Debug)]
pub struct RunOutcome {
    /// UUID identifying the run and its artifact directory.
    pub run_id: String,
    /// Where the artifacts were written.
    pub artifact_dir: PathBuf,
    /// How many assets resolved out of the universe.
    pub resolved: usize,
    /// Total assets in the universe.
    pub universe: usize,
    /// Orders generated by the diff.
    pub orders: usize,
    /// The reconciliation verdicts.
    pub report: ReconciliationReport,
}

/// The rebalancing engine: owns the pool, cache, and pipeline stages.
pub struct RebalanceEngine {
    config: Config,
    pool: Arc<SessionPool>,
    cache: Arc<ResolutionCache>,
}

impl RebalanceEngine {
    /// Connect the session pool and load the persisted resolution cache.
    ///
    /// # Errors
    ///
    /// Returns an error when no broker session can be established or the
    /// persisted cache file is unreadable.
    pub async fn connect(config: Config, connector: Arc<dyn Connector>) -> Result<Self, EngineError> {
        let pool = Arc::new(SessionPool::connect(connector, config.broker.clone()).await?);
        let cache = Arc::new(ResolutionCache::new(config.resolution.cache_ttl()));
        if let Some(path) = config.resolution.cache_path.as_deref() {
            cache.load_from(Path::new(path))?;
        }
        Ok(Self {
            config,
            pool,
            cache,
        })
    }

    /// Execute one full rebalance pass.
    ///
    /// # Errors
    ///
    /// Returns an error when an artifact cannot be written or the live
    /// position fetch fails. Per-asset and per-order failures are recorded
    /// in the artifacts instead of aborting the pass.
    pub async fn run(
        &self,
        assets: &[Asset],
        targets: &TargetAllocation,
    ) -> Result<RunOutcome, EngineError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now().to_rfc3339();
        let artifact_dir = Path::new(&self.config.artifacts.output_dir).join(&run_id);
        std::fs::create_dir_all(&artifact_dir)?;
        info!(run_id = %run_id, universe = assets.len(), "rebalance run starting");

        let resolver = Arc::new(InstrumentResolver::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.cache),
            self.config.resolution.clone(),
        ));
        let records = resolver.resolve_universe(assets).await;
        let resolved = records.iter().filter(|r| r.is_resolved()).count();
        write_artifact(
            &artifact_dir.join("resolution.json"),
            &ResolutionArtifact {
                run_id: &run_id,
                started_at: &started_at,
                records: &records,
                cache: self.cache.stats(),
            },
        )?;

        let positions = self.fetch_positions().await?;
        let plan = build_order_plan(&records, targets, &positions);
        write_artifact(&artifact_dir.join("orders.json"), &plan)?;

        let submitter = ExecutionSubmitter::new(
            Arc::clone(&self.pool),
            self.config.submission.clone(),
        );
        let submissions = submitter.submit_all(&plan.orders).await;

        if !submissions.is_empty() {
            let settle = self.config.reconciliation.settle_window();
            info!(secs = settle.as_secs(), "waiting for broker state to settle");
            tokio::time::sleep(settle).await;
        }

        let reconciler = ReconciliationEngine::new(
            Arc::clone(&self.pool),
            self.config.reconciliation.clone(),
        );
        let report = reconciler.reconcile(&submissions).await;
        if let Some(e) = report.incomplete_error() {
            warn!(run_id = %run_id, error = %e, "verdicts reached from partial broker state");
        }
        write_artifact(&artifact_dir.join("reconciliation.json"), &report)?;

        if let Some(path) = self.config.resolution.cache_path.as_deref() {
            if let Err(e) = self.cache.save_to(Path::new(path)) {
                warn!(error = %e, "resolution cache was not persisted");
            }
        }

        let pool_stats = self.pool.stats();
        info!(
            run_id = %run_id,
            resolved,
            orders = plan.orders.len(),
            success_rate = report.success_rate,
            sessions_total = pool_stats.total,
            sessions_available = pool_stats.available,
            "rebalance run finished"
        );

        Ok(RunOutcome {
            run_id,
            artifact_dir,
            resolved,
            universe: assets.len(),
            orders: plan.orders.len(),
            report,
        })
    }

    /// Pull live positions; a run cannot proceed on stale holdings.
    async fn fetch_positions(&self) -> Result<PositionSnapshot, EngineError> {
        let session = self.pool.acquire().await?;
        let positions = session
            .positions()
            .await
            .map_err(|e| EngineError::BrokerUnavailable {
                reason: format!("position fetch failed: {e}"),
            })?;
        let map: HashMap<String, i64> = positions
            .into_iter()
            .map(|p| (p.symbol, p.quantity))
            .collect();
        Ok(PositionSnapshot::new(map, Utc::now().to_rfc3339()))
    }

    /// The generated plan for these inputs, without submitting anything.
    ///
    /// # Errors
    ///
    /// Returns an error when live positions cannot be fetched.
    pub async fn dry_run(
        &self,
        assets: &[Asset],
        targets: &TargetAllocation,
    ) -> Result<OrderPlan, EngineError> {
        let resolver = Arc::new(InstrumentResolver::new(
            Arc::clone(&self.pool),
            Arc::clone(&self.cache),
            self.config.resolution.clone(),
        ));
        let records = resolver.resolve_universe(assets).await;
        let positions = self.fetch_positions().await?;
        Ok(build_order_plan(&records, targets, &positions))
    }
}

impl std::fmt::Debug for RebalanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebalanceEngine")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn write_artifact<T: Serialize>(path: &Path, artifact: &T) -> Result<(), EngineError> {
    let json = serde_json::to_string_pretty(artifact)?;
    std::fs::write(path, json)?;
    Ok(())
}
