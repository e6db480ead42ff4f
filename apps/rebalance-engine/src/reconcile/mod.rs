//! Post-trade reconciliation against broker ledgers.
//!
//! After the settle window the broker is the only source of truth. The
//! engine pulls open orders, completed orders, executions, and positions
//! under one shared time budget, then classifies every submitted order
//! from that evidence. Local submission state is consulted only when the
//! broker ledgers carry no trace of the order.

pub mod classify;
pub mod report;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use crate::broker::{
    BrokerCompletedOrder, BrokerExecution, BrokerOpenOrder, BrokerPosition, SessionPool,
};
use crate::config::ReconciliationConfig;
use crate::models::OrderStatusRecord;

pub use classify::{Classification, ErrorRule, ErrorRuleTable};
pub use report::{ReconciledOrder, ReconciliationReport};

/// Broker state fetched for one reconciliation pass.
///
/// `None` means the fetch failed or timed out; verdicts fall back to
/// `Unknown` rather than guessing.
#[derive(Debug, Default)]
struct BrokerState {
    open: Option<Vec<BrokerOpenOrder>>,
    completed: Option<Vec<BrokerCompletedOrder>>,
    executions: Option<Vec<BrokerExecution>>,
    positions: Option<Vec<BrokerPosition>>,
}

impl BrokerState {
    fn is_incomplete(&self) -> bool {
        self.open.is_none()
            || self.completed.is_none()
            || self.executions.is_none()
            || self.positions.is_none()
    }
}

/// Reconciles submitted orders against broker ledgers.
pub struct ReconciliationEngine {
    pool: Arc<SessionPool>,
    config: ReconciliationConfig,
    rules: ErrorRuleTable,
}

impl ReconciliationEngine {
    /// Build a reconciler over a session pool.
    #[must_use]
    pub fn new(pool: Arc<SessionPool>, config: ReconciliationConfig) -> Self {
        let rules = ErrorRuleTable::with_extra_rules(&config.extra_error_rules);
        Self {
            pool,
            config,
            rules,
        }
    }

    /// Run one reconciliation pass over the submitted orders.
    pub async fn reconcile(&self, records: &[OrderStatusRecord]) -> ReconciliationReport {
        let started = Instant::now();
        let deadline = started + self.config.fetch_timeout();
        let mut fetch_errors = Vec::new();

        let state = self.fetch_state(deadline, &mut fetch_errors).await;
        if state.is_incomplete() {
            warn!(
                errors = fetch_errors.len(),
                "broker state fetch incomplete, verdicts degrade to unknown"
            );
        }

        let results: Vec<ReconciledOrder> = records
            .iter()
            .map(|record| self.classify_order(record, &state))
            .collect();

        let successes = results
            .iter()
            .filter(|r| r.classification.is_success())
            .count();
        let success_rate = if results.is_empty() {
            1.0
        } else {
            successes as f64 / results.len() as f64
        };

        info!(
            orders = results.len(),
            successes,
            incomplete = state.is_incomplete(),
            "reconciliation pass finished"
        );

        ReconciliationReport {
            results,
            success_rate,
            incomplete: state.is_incomplete(),
            fetch_errors,
            completed_at: Utc::now().to_rfc3339(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    async fn fetch_state(&self, deadline: Instant, errors: &mut Vec<String>) -> BrokerState {
        let mut state = BrokerState::default();

        match self
            .fetch(deadline, "open orders", |s| async move { s.open_orders().await })
            .await
        {
            Ok(open) => state.open = Some(open),
            Err(e) => errors.push(e),
        }
        match self
            .fetch(deadline, "completed orders", |s| async move {
                s.completed_orders().await
            })
            .await
        {
            Ok(completed) => state.completed = Some(completed),
            Err(e) => errors.push(e),
        }
        match self
            .fetch(deadline, "executions", |s| async move { s.executions().await })
            .await
        {
            Ok(executions) => state.executions = Some(executions),
            Err(e) => errors.push(e),
        }
        match self
            .fetch(deadline, "positions", |s| async move { s.positions().await })
            .await
        {
            Ok(positions) => state.positions = Some(positions),
            Err(e) => errors.push(e),
        }

        state
    }

    /// One ledger fetch under the shared deadline.
    async fn fetch<T, F, Fut>(
        &self,
        deadline: Instant,
        what: &str,
        call: F,
    ) -> Result<T, String>
    where
        F: FnOnce(crate::broker::PooledSession) -> Fut,
        Fut: std::future::Future<Output = Result<T, crate::broker::SessionError>>,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining == Duration::ZERO {
            return Err(format!("{what}: reconciliation time budget exhausted"));
        }
        let session = self
            .pool
            .acquire()
            .await
            .map_err(|e| format!("{what}: {e}"))?;
        tokio::time::timeout(remaining, call(session))
            .await
            .map_err(|_| format!("{what}: fetch timed out"))?
            .map_err(|e| format!("{what}: {e}"))
    }

    /// Classify one order from broker evidence, in priority order.
    ///
    /// Ledgers are matched by (symbol, action), which the diff guarantees
    /// unique per run; the locally recorded broker order id only breaks
    /// ties and is never required, so matching survives stale local state.
    fn classify_order(&self, record: &OrderStatusRecord, state: &BrokerState) -> ReconciledOrder {
        let broker_id: Option<i64> = record.broker_order_id.parse().ok();

        let completed = state.completed.as_deref().and_then(|orders| {
            pick_match(
                orders,
                |o| o.symbol == record.symbol && o.action == record.action,
                |o| o.broker_order_id,
                broker_id,
            )
        });
        let open = state.open.as_deref().and_then(|orders| {
            pick_match(
                orders,
                |o| o.symbol == record.symbol && o.action == record.action,
                |o| o.broker_order_id,
                broker_id,
            )
        });
        let executed_quantity: Option<i64> = state.executions.as_deref().map(|executions| {
            executions
                .iter()
                .filter(|e| e.symbol == record.symbol && e.action == record.action)
                .map(|e| e.quantity)
                .sum()
        });

        let broker_filled = completed
            .map(|o| o.filled_quantity)
            .or_else(|| open.map(|o| o.filled_quantity))
            .or(executed_quantity)
            .unwrap_or(0);

        let (classification, narrative) =
            self.verdict(record, state, completed, open, executed_quantity);

        ReconciledOrder {
            symbol: record.symbol.clone(),
            action: record.action,
            requested_quantity: record.requested_quantity,
            broker_filled_quantity: broker_filled,
            classification,
            narrative,
            submission: record.clone(),
        }
    }

    fn verdict(
        &self,
        record: &OrderStatusRecord,
        state: &BrokerState,
        completed: Option<&BrokerCompletedOrder>,
        open: Option<&BrokerOpenOrder>,
        executed_quantity: Option<i64>,
    ) -> (Classification, String) {
        let symbol = record.symbol.as_str();

        if let Some(order) = completed {
            if let Some(code) = order.error_code.as_deref() {
                return self.rules.lookup(code, symbol).unwrap_or((
                    Classification::Unknown,
                    format!("{symbol}: rejected with unmapped broker code {code}"),
                ));
            }
            if order.filled_quantity == record.requested_quantity {
                return (
                    Classification::FilledExact,
                    format!("{symbol}: filled {} as requested", order.filled_quantity),
                );
            }
            return (
                Classification::QuantityMismatch,
                format!(
                    "{symbol}: broker reports {} filled, {} requested",
                    order.filled_quantity, record.requested_quantity
                ),
            );
        }

        if let Some(order) = open {
            if let Some(code) = order.info_code.as_deref() {
                if let Some(verdict) = self.rules.lookup(code, symbol) {
                    return verdict;
                }
            }
            if order.filled_quantity > 0 {
                return (
                    Classification::QuantityMismatch,
                    format!(
                        "{symbol}: {} of {} filled, remainder still working",
                        order.filled_quantity, order.quantity
                    ),
                );
            }
            return (
                Classification::PendingMarketHours,
                format!("{symbol}: order working at the broker, nothing filled yet"),
            );
        }

        if let Some(executed) = executed_quantity.filter(|q| *q > 0) {
            if executed == record.requested_quantity {
                return (
                    Classification::FilledExact,
                    format!("{symbol}: executions account for the full {executed}"),
                );
            }
            return (
                Classification::QuantityMismatch,
                format!(
                    "{symbol}: executions account for {executed} of {}",
                    record.requested_quantity
                ),
            );
        }

        // Broker ledgers have no trace; the local rejection code still
        // explains what happened.
        if !record.error_code.is_empty() {
            if let Some(verdict) = self.rules.lookup(&record.error_code, symbol) {
                return verdict;
            }
            return (
                Classification::Unknown,
                format!(
                    "{symbol}: rejected with unmapped broker code {}",
                    record.error_code
                ),
            );
        }

        if let Some(positions) = state.positions.as_deref() {
            if positions
                .iter()
                .any(|p| p.symbol == record.symbol && p.quantity != 0)
            {
                return (
                    Classification::QuantityMismatch,
                    format!("{symbol}: position present but no order trail at the broker"),
                );
            }
        }

        if state.is_incomplete() {
            return (
                Classification::Unknown,
                format!("{symbol}: broker state incomplete, cannot verify"),
            );
        }

        (
            Classification::NotFound,
            format!("{symbol}: no trace of the order in any broker ledger"),
        )
    }
}

/// Pick the ledger entry for an order: first by key, then by broker order
/// id when several entries share the key.
fn pick_match<T>(
    items: &[T],
    is_match: impl Fn(&T) -> bool,
    broker_id: impl Fn(&T) -> i64,
    want_id: Option<i64>,
) -> Option<&T> {
    want_id
        .and_then(|want| items.iter().find(|t| is_match(t) && broker_id(t) == want))
        .or_else(|| items.iter().find(|t| is_match(t)))
}

impl std::fmt::Debug for ReconciliationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{SessionPool, SimulatedBroker};
    use crate::config::BrokerConfig;
    use crate::models::{OrderAction, OrderStatus};
    use rust_decimal::Decimal;

    fn record(symbol: &str, quantity: i64, broker_order_id: &str) -> OrderStatusRecord {
        OrderStatusRecord {
            client_order_id: format!("c-{symbol}"),
            broker_order_id: broker_order_id.to_string(),
            symbol: symbol.to_string(),
            action: OrderAction::Buy,
            requested_quantity: quantity,
            filled_quantity: 0,
            remaining_quantity: quantity,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::Submitted,
            raw_status: String::new(),
            error_code: String::new(),
            submitted_at: "2026-03-02T15:00:00Z".to_string(),
        }
    }

    async fn engine_over(venue: SimulatedBroker) -> ReconciliationEngine {
        let pool = SessionPool::connect(Arc::new(venue), BrokerConfig::default())
            .await
            .expect("pool connects");
        ReconciliationEngine::new(Arc::new(pool), ReconciliationConfig::default())
    }

    async fn place(venue: &SimulatedBroker, symbol: &str, quantity: i64) -> String {
        use crate::broker::{Connector, WireOrder, WireOrderType, WireTimeInForce};
        use crate::broker::BrokerSession;
        use std::time::Duration;

        let transport = venue.connect(99).await.expect("sim connects");
        let session = BrokerSession::spawn(99, transport, Duration::from_secs(2));
        match session
            .place_order(WireOrder {
                client_order_id: format!("c-{symbol}"),
                broker_ref: 1,
                symbol: symbol.to_string(),
                action: OrderAction::Buy,
                quantity,
                order_type: WireOrderType::Market,
                time_in_force: WireTimeInForce::Day,
            })
            .await
        {
            Ok(ack) => ack.broker_order_id.to_string(),
            Err(_) => String::new(),
        }
    }

    #[tokio::test]
    async fn exact_fill_classifies_filled_exact() {
        let venue = SimulatedBroker::new();
        let id = place(&venue, "ACME", 10).await;
        let engine = engine_over(venue).await;

        let report = engine.reconcile(&[record("ACME", 10, &id)]).await;
        assert_eq!(report.results[0].classification, Classification::FilledExact);
        assert_eq!(report.results[0].broker_filled_quantity, 10);
        assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
        assert!(!report.incomplete);
    }

    #[tokio::test]
    async fn stale_broker_order_id_still_matches_by_symbol_and_action() {
        let venue = SimulatedBroker::new();
        place(&venue, "ACME", 10).await;
        let engine = engine_over(venue).await;

        // A crashed run can leave a broker order id that no ledger knows;
        // the (symbol, action) key still finds the fill.
        let report = engine.reconcile(&[record("ACME", 10, "999999")]).await;
        assert_eq!(report.results[0].classification, Classification::FilledExact);
        assert_eq!(report.results[0].broker_filled_quantity, 10);
    }

    #[tokio::test]
    async fn partial_fill_classifies_quantity_mismatch() {
        let venue = SimulatedBroker::new().partial_fill("ACME", 4);
        let id = place(&venue, "ACME", 10).await;
        let engine = engine_over(venue).await;

        let report = engine.reconcile(&[record("ACME", 10, &id)]).await;
        assert_eq!(
            report.results[0].classification,
            Classification::QuantityMismatch
        );
        assert_eq!(report.results[0].broker_filled_quantity, 4);
    }

    #[tokio::test]
    async fn held_order_classifies_pending_market_hours() {
        let venue = SimulatedBroker::new().hold_order("ACME", "399", "after hours");
        let id = place(&venue, "ACME", 10).await;
        let engine = engine_over(venue).await;

        let report = engine.reconcile(&[record("ACME", 10, &id)]).await;
        assert_eq!(
            report.results[0].classification,
            Classification::PendingMarketHours
        );
    }

    #[tokio::test]
    async fn rejection_code_classifies_from_rule_table() {
        let venue = SimulatedBroker::new().reject_order("ACME", "203", "not available");
        place(&venue, "ACME", 10).await;
        let engine = engine_over(venue).await;

        // The rejection never produced a broker order id locally.
        let mut local = record("ACME", 10, "");
        local.error_code = "203".to_string();

        let report = engine.reconcile(&[local]).await;
        assert_eq!(
            report.results[0].classification,
            Classification::AccountRestriction
        );
        assert_ne!(report.results[0].classification, Classification::NotFound);
    }

    #[tokio::test]
    async fn untraced_order_classifies_not_found() {
        let engine = engine_over(SimulatedBroker::new()).await;
        let report = engine.reconcile(&[record("GHOST", 10, "")]).await;
        assert_eq!(report.results[0].classification, Classification::NotFound);
        assert!(!report.incomplete);
    }

    #[tokio::test]
    async fn position_without_order_trail_is_a_mismatch() {
        let venue = SimulatedBroker::new().with_position("ACME", 25);
        let engine = engine_over(venue).await;
        let report = engine.reconcile(&[record("ACME", 10, "")]).await;
        assert_eq!(
            report.results[0].classification,
            Classification::QuantityMismatch
        );
    }

    #[tokio::test]
    async fn empty_plan_reconciles_clean() {
        let engine = engine_over(SimulatedBroker::new()).await;
        let report = engine.reconcile(&[]).await;
        assert!(report.results.is_empty());
        assert!((report.success_rate - 1.0).abs() < f64::EPSILON);
    }
}
