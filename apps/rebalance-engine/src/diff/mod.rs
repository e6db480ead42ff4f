//! Order generation: diff target allocations against live positions.
//!
//! Targets are expressed per vendor ticker but trade per broker symbol, so
//! the first step folds every resolved ticker into its broker symbol and
//! sums the target quantities. The diff then compares against the live
//! position for each symbol and emits market orders: sells before buys so
//! freed-up capital funds the purchases, largest quantities first within
//! each side.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::models::{Order, OrderAction, PositionSnapshot, ResolutionRecord, TargetAllocation};

/// Aggregate counts for one generated plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanTotals {
    /// Number of buy orders.
    pub buy_orders: usize,
    /// Number of sell orders.
    pub sell_orders: usize,
    /// Units bought across all buy orders.
    pub buy_quantity: i64,
    /// Units sold across all sell orders.
    pub sell_quantity: i64,
}

/// The ordered set of orders for one run, as persisted to disk.
#[derive(Debug, Clone, Serialize)]
pub struct OrderPlan {
    /// Orders in submission order: sells first, descending quantity.
    pub orders: Vec<Order>,
    /// Aggregate counts.
    pub totals: PlanTotals,
    /// Tickers that had a target but no resolved instrument.
    pub skipped_tickers: Vec<String>,
}

/// Per-symbol accumulation before diffing.
#[derive(Debug, Default)]
struct SymbolTarget {
    quantity: i64,
    broker_ref: i64,
    source_tickers: Vec<String>,
    currency: String,
}

/// Build the order plan from resolutions, targets, and live positions.
#[must_use]
pub fn build_order_plan(
    records: &[ResolutionRecord],
    targets: &TargetAllocation,
    positions: &PositionSnapshot,
) -> OrderPlan {
    let mut by_symbol: BTreeMap<String, SymbolTarget> = BTreeMap::new();
    let mut skipped = Vec::new();

    for (ticker, quantity) in targets.iter() {
        let resolved = records
            .iter()
            .find(|r| r.ticker == ticker)
            .and_then(|r| r.instrument.as_ref());
        match resolved {
            Some(instrument) => {
                let entry = by_symbol.entry(instrument.symbol.clone()).or_default();
                entry.quantity += quantity;
                entry.broker_ref = instrument.broker_id;
                entry.currency = instrument.currency.clone();
                if !entry.source_tickers.iter().any(|t| t == ticker) {
                    entry.source_tickers.push(ticker.to_string());
                }
            }
            None => {
                warn!(ticker, "target skipped, instrument unresolved");
                skipped.push(ticker.to_string());
            }
        }
    }

    // Symbols held now but absent from the targets are liquidated.
    for (symbol, current) in positions.iter() {
        if current != 0 && !by_symbol.contains_key(symbol) {
            by_symbol.insert(symbol.to_string(), SymbolTarget::default());
        }
    }

    let mut orders = Vec::new();
    for (symbol, target) in by_symbol {
        let current = positions.quantity(&symbol);
        let delta = target.quantity - current;
        if delta == 0 {
            continue;
        }
        let action = if delta > 0 {
            OrderAction::Buy
        } else {
            OrderAction::Sell
        };
        orders.push(Order {
            symbol,
            action,
            quantity: delta.abs(),
            current_quantity: current,
            target_quantity: target.quantity,
            source_tickers: target.source_tickers,
            broker_ref: target.broker_ref,
            currency: target.currency,
        });
    }

    // Sells first so their proceeds are available; biggest orders lead.
    orders.sort_by(|a, b| {
        let side = |o: &Order| match o.action {
            OrderAction::Sell => 0,
            OrderAction::Buy => 1,
        };
        side(a)
            .cmp(&side(b))
            .then(b.quantity.cmp(&a.quantity))
            .then(a.symbol.cmp(&b.symbol))
    });

    let totals = orders.iter().fold(PlanTotals::default(), |mut t, o| {
        match o.action {
            OrderAction::Buy => {
                t.buy_orders += 1;
                t.buy_quantity += o.quantity;
            }
            OrderAction::Sell => {
                t.sell_orders += 1;
                t.sell_quantity += o.quantity;
            }
        }
        t
    });

    info!(
        sells = totals.sell_orders,
        buys = totals.buy_orders,
        skipped = skipped.len(),
        "order plan built"
    );

    OrderPlan {
        orders,
        totals,
        skipped_tickers: skipped,
    }
}
