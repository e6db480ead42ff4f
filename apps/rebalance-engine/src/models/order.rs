//! Orders and the broker-side order lifecycle.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderAction {
    /// Increase the position.
    Buy,
    /// Decrease the position.
    Sell,
}

impl OrderAction {
    /// Apply the action's sign to an absolute quantity.
    #[must_use]
    pub const fn signed(self, quantity: i64) -> i64 {
        match self {
            Self::Buy => quantity,
            Self::Sell => -quantity,
        }
    }
}

impl std::fmt::Display for OrderAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// One intended trade for one distinct broker instrument.
///
/// Multiple source assets resolving to the same instrument have their
/// target quantities summed before diffing, so a run never carries two
/// orders for the same instrument. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Resolved broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Unsigned share quantity to trade.
    pub quantity: i64,
    /// Held quantity at diff time.
    pub current_quantity: i64,
    /// Target quantity after the rebalance.
    pub target_quantity: i64,
    /// Upstream tickers that contributed to this order.
    pub source_tickers: Vec<String>,
    /// Broker-native contract identifier.
    pub broker_ref: i64,
    /// Instrument trading currency, empty when only known from positions.
    pub currency: String,
}

/// Broker-side lifecycle of a submitted order.
///
/// Created → Submitted → {Acknowledged, Rejected} →
/// {PartiallyFilled, Filled, Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order produced by the diff engine, not yet sent.
    Created,
    /// Wire order handed to the broker session.
    Submitted,
    /// Broker acknowledged the order.
    Acknowledged,
    /// Broker rejected the order.
    Rejected,
    /// Some quantity filled, remainder working.
    PartiallyFilled,
    /// Fully filled.
    Filled,
    /// Cancelled before completion.
    Cancelled,
}

impl OrderStatus {
    /// Whether the order can still change state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Filled | Self::Cancelled)
    }

    /// Whether a transition to `next` is legal in the lifecycle.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Submitted)
                | (Self::Submitted, Self::Acknowledged | Self::Rejected)
                | (
                    Self::Acknowledged,
                    Self::PartiallyFilled | Self::Filled | Self::Cancelled
                )
                | (
                    Self::PartiallyFilled,
                    Self::PartiallyFilled | Self::Filled | Self::Cancelled
                )
        )
    }
}

/// Illegal order lifecycle transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal order transition {from:?} -> {to:?}")]
pub struct OrderTransitionError {
    /// Status before the attempted transition.
    pub from: OrderStatus,
    /// Status the transition attempted to reach.
    pub to: OrderStatus,
}

/// Mutable submission record for one order, updated only from
/// broker-reported events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusRecord {
    /// Client-side order id (UUID).
    pub client_order_id: String,
    /// Broker-assigned order id, empty until acknowledged.
    pub broker_order_id: String,
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Requested share quantity.
    pub requested_quantity: i64,
    /// Filled share quantity.
    pub filled_quantity: i64,
    /// Quantity still working at the broker.
    pub remaining_quantity: i64,
    /// Average fill price, zero until a fill is reported.
    pub avg_fill_price: Decimal,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Raw broker status or error text, verbatim.
    pub raw_status: String,
    /// Broker error code when rejected, empty otherwise.
    pub error_code: String,
    /// Submission timestamp (RFC 3339).
    pub submitted_at: String,
}

impl OrderStatusRecord {
    /// Apply a lifecycle transition, validating it against the state machine.
    ///
    /// # Errors
    ///
    /// Returns `OrderTransitionError` when the transition is not legal.
    pub fn transition(&mut self, next: OrderStatus) -> Result<(), OrderTransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderTransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Submitted.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn lifecycle_happy_path() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Submitted));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::Acknowledged));
        assert!(OrderStatus::Acknowledged.can_transition_to(OrderStatus::PartiallyFilled));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn lifecycle_rejects_backwards_moves() {
        assert!(!OrderStatus::Filled.can_transition_to(OrderStatus::Submitted));
        assert!(!OrderStatus::Rejected.can_transition_to(OrderStatus::Acknowledged));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Filled));
    }

    #[test]
    fn record_transition_validates() {
        let mut record = OrderStatusRecord {
            client_order_id: "c-1".to_string(),
            broker_order_id: String::new(),
            symbol: "ACME".to_string(),
            action: OrderAction::Buy,
            requested_quantity: 60,
            filled_quantity: 0,
            remaining_quantity: 60,
            avg_fill_price: Decimal::ZERO,
            status: OrderStatus::Created,
            raw_status: String::new(),
            error_code: String::new(),
            submitted_at: String::new(),
        };

        assert!(record.transition(OrderStatus::Submitted).is_ok());
        assert!(record.transition(OrderStatus::Acknowledged).is_ok());

        let err = record
            .transition(OrderStatus::Submitted)
            .expect_err("backwards transition must fail");
        assert_eq!(err.from, OrderStatus::Acknowledged);
        assert_eq!(err.to, OrderStatus::Submitted);
    }

    #[test]
    fn action_display() {
        assert_eq!(OrderAction::Buy.to_string(), "BUY");
        assert_eq!(OrderAction::Sell.to_string(), "SELL");
    }
}
