//! Order submission with pacing and per-order fault isolation.
//!
//! Orders are submitted strictly in plan order, one at a time, with a
//! configurable pause between sends so the broker's rate limits are never
//! in play. A rejection or timeout on one order is recorded and the run
//! moves on; it never aborts the remaining orders.

pub mod order_type;

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::broker::{SessionError, SessionPool, WireOrder};
use crate::config::SubmissionConfig;
use crate::error::EngineError;
use crate::models::{Order, OrderStatus, OrderStatusRecord};

pub use order_type::{select_order_type, Locality, MarketSession};

/// Submits an order plan through the session pool.
pub struct ExecutionSubmitter {
    pool: Arc<SessionPool>,
    config: SubmissionConfig,
}

impl ExecutionSubmitter {
    /// Build a submitter over a session pool.
    #[must_use]
    pub const fn new(pool: Arc<SessionPool>, config: SubmissionConfig) -> Self {
        Self { pool, config }
    }

    /// Submit every order, returning one status record per order.
    ///
    /// Records for orders that never reached the broker stay in
    /// `Submitted` with an explanatory raw status.
    pub async fn submit_all(&self, orders: &[Order]) -> Vec<OrderStatusRecord> {
        let session_state = MarketSession::at(Utc::now());
        let mut records = Vec::with_capacity(orders.len());

        for (i, order) in orders.iter().enumerate() {
            records.push(self.submit_one(order, session_state).await);
            if i + 1 < orders.len() {
                tokio::time::sleep(self.config.pacing_delay()).await;
            }
        }

        let filled = records
            .iter()
            .filter(|r| r.status == OrderStatus::Filled)
            .count();
        let rejected = records
            .iter()
            .filter(|r| r.status == OrderStatus::Rejected)
            .count();
        info!(
            submitted = records.len(),
            filled, rejected, "order submission pass finished"
        );
        records
    }

    async fn submit_one(&self, order: &Order, session_state: MarketSession) -> OrderStatusRecord {
        let client_order_id = Uuid::new_v4().to_string();
        let mut record = OrderStatusRecord {
            client_order_id: client_order_id.clone(),
            broker_order_id: String::new(),
            symbol: order.symbol.clone(),
            action: order.action,
            requested_quantity: order.quantity,
            filled_quantity: 0,
            remaining_quantity: order.quantity,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::Created,
            raw_status: String::new(),
            error_code: String::new(),
            submitted_at: String::new(),
        };

        let (order_type, time_in_force) =
            select_order_type(&order.currency, &self.config.local_currency, session_state);
        let wire = WireOrder {
            client_order_id,
            broker_ref: order.broker_ref,
            symbol: order.symbol.clone(),
            action: order.action,
            quantity: order.quantity,
            order_type,
            time_in_force,
        };

        let session = match self.pool.acquire().await {
            Ok(session) => session,
            Err(e) => {
                warn!(symbol = %order.symbol, error = %e, "no session for submission");
                record.raw_status = format!("not submitted: {e}");
                return record;
            }
        };

        apply_transition(&mut record, OrderStatus::Submitted);
        record.submitted_at = Utc::now().to_rfc3339();
        info!(
            symbol = %order.symbol,
            action = %order.action,
            quantity = order.quantity,
            order_type = ?order_type,
            "submitting order"
        );

        match session.place_order(wire).await {
            Ok(ack) => {
                record.broker_order_id = ack.broker_order_id.to_string();
                record.filled_quantity = ack.filled_quantity;
                record.remaining_quantity = ack.remaining_quantity;
                record.avg_fill_price = ack.avg_fill_price;
                record.raw_status = ack.raw_status.clone();
                if let Some(code) = ack.info_code {
                    // Informational holds carry a code without being errors.
                    record.error_code = code;
                }
                apply_transition(&mut record, OrderStatus::Acknowledged);
                if ack.raw_status == "Filled" {
                    apply_transition(&mut record, OrderStatus::Filled);
                } else if ack.filled_quantity > 0 {
                    apply_transition(&mut record, OrderStatus::PartiallyFilled);
                }
            }
            Err(SessionError::Api { code, message }) => {
                record.error_code.clone_from(&code);
                record.raw_status.clone_from(&message);
                let rejection = EngineError::SubmissionRejected {
                    symbol: order.symbol.clone(),
                    code,
                    message,
                };
                warn!(error = %rejection, "order rejected");
                apply_transition(&mut record, OrderStatus::Rejected);
            }
            Err(e) => {
                // No acknowledgement either way; reconciliation settles it.
                warn!(symbol = %order.symbol, error = %e, "submission outcome unknown");
                record.raw_status = format!("no acknowledgement: {e}");
            }
        }

        record
    }
}

fn apply_transition(record: &mut OrderStatusRecord, next: OrderStatus) {
    if let Err(e) = record.transition(next) {
        warn!(symbol = %record.symbol, error = %e, "skipping illegal status transition");
    }
}

impl std::fmt::Debug for ExecutionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionSubmitter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SimulatedBroker;
    use crate::config::BrokerConfig;
    use crate::models::OrderAction;

    fn order(symbol: &str, action: OrderAction, quantity: i64) -> Order {
        Order {
            symbol: symbol.to_string(),
            action,
            quantity,
            current_quantity: 0,
            target_quantity: quantity,
            source_tickers: vec![symbol.to_string()],
            broker_ref: 1,
            currency: "USD".to_string(),
        }
    }

    async fn submitter_over(venue: SimulatedBroker) -> ExecutionSubmitter {
        let pool = SessionPool::connect(Arc::new(venue), BrokerConfig::default())
            .await
            .expect("pool connects");
        ExecutionSubmitter::new(
            Arc::new(pool),
            SubmissionConfig {
                pacing_delay_ms: 0,
                ..SubmissionConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn filled_order_reaches_terminal_state() {
        let submitter = submitter_over(SimulatedBroker::new()).await;
        let records = submitter.submit_all(&[order("ACME", OrderAction::Buy, 10)]).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, OrderStatus::Filled);
        assert_eq!(records[0].filled_quantity, 10);
        assert_eq!(records[0].remaining_quantity, 0);
        assert!(!records[0].broker_order_id.is_empty());
    }

    #[tokio::test]
    async fn rejection_is_recorded_and_run_continues() {
        let venue = SimulatedBroker::new().reject_order("BAD", "201", "margin breach");
        let submitter = submitter_over(venue).await;
        let records = submitter
            .submit_all(&[
                order("BAD", OrderAction::Buy, 10),
                order("GOOD", OrderAction::Buy, 5),
            ])
            .await;

        assert_eq!(records[0].status, OrderStatus::Rejected);
        assert_eq!(records[0].error_code, "201");
        assert_eq!(records[0].raw_status, "margin breach");
        assert_eq!(records[1].status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn informational_hold_is_acknowledged_not_rejected() {
        let venue = SimulatedBroker::new().hold_order("ACME", "399", "queued for next session");
        let submitter = submitter_over(venue).await;
        let records = submitter.submit_all(&[order("ACME", OrderAction::Buy, 10)]).await;

        assert_eq!(records[0].status, OrderStatus::Acknowledged);
        assert_eq!(records[0].error_code, "399");
        assert_eq!(records[0].filled_quantity, 0);
    }

    #[tokio::test]
    async fn partial_fill_lands_in_partially_filled() {
        let venue = SimulatedBroker::new().partial_fill("ACME", 4);
        let submitter = submitter_over(venue).await;
        let records = submitter.submit_all(&[order("ACME", OrderAction::Buy, 10)]).await;

        assert_eq!(records[0].status, OrderStatus::PartiallyFilled);
        assert_eq!(records[0].filled_quantity, 4);
        assert_eq!(records[0].remaining_quantity, 6);
    }

    #[tokio::test]
    async fn every_record_gets_a_distinct_client_id() {
        let submitter = submitter_over(SimulatedBroker::new()).await;
        let records = submitter
            .submit_all(&[
                order("AAA", OrderAction::Buy, 1),
                order("BBB", OrderAction::Buy, 2),
            ])
            .await;
        assert_ne!(records[0].client_order_id, records[1].client_order_id);
    }
}
