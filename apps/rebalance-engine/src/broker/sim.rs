//! Simulated broker venue.
//!
//! Implements [`Connector`] against an in-memory catalog and account so the
//! whole engine can run without real broker connectivity. Paper runs and
//! integration tests seed it with instruments, positions, and per-symbol
//! order behaviors (reject, hold, partial fill).

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::EngineError;
use crate::models::BrokerInstrument;

use super::api::{
    BrokerCompletedOrder, BrokerEvent, BrokerExecution, BrokerOpenOrder, BrokerPosition,
    BrokerRequest, BrokerTransport, Connector, PlaceOrderAck, SessionError, SymbolSample,
    WireOrder,
};

/// One catalog row: an instrument with its identifiers.
#[derive(Debug, Clone)]
struct CatalogEntry {
    instrument: BrokerInstrument,
    isin: Option<String>,
    name: String,
    country: String,
}

/// What the venue does with an order for a given symbol.
#[derive(Debug, Clone)]
enum OrderBehavior {
    /// Fill the full quantity immediately.
    Fill,
    /// Fill only this many units, leave the rest working.
    PartialFill(i64),
    /// Accept but hold, reporting an informational code on the ack.
    Hold { info_code: String, message: String },
    /// Reject with a broker error code.
    Reject { code: String, message: String },
}

#[derive(Debug, Default)]
struct VenueState {
    catalog: Vec<CatalogEntry>,
    positions: BTreeMap<String, i64>,
    behaviors: BTreeMap<String, OrderBehavior>,
    prices: BTreeMap<String, Decimal>,
    open_orders: Vec<BrokerOpenOrder>,
    completed_orders: Vec<BrokerCompletedOrder>,
    executions: Vec<BrokerExecution>,
    next_order_id: i64,
    request_count: u64,
    refuse_connections: bool,
}

impl VenueState {
    fn fill_price(&self, symbol: &str) -> Decimal {
        self.prices
            .get(symbol)
            .copied()
            .unwrap_or_else(|| Decimal::new(100, 0))
    }

    fn next_broker_order_id(&mut self) -> i64 {
        self.next_order_id += 1;
        self.next_order_id
    }

    fn record_fill(&mut self, order: &WireOrder, broker_order_id: i64, quantity: i64) {
        let price = self.fill_price(&order.symbol);
        let signed = order.action.signed(quantity);
        *self.positions.entry(order.symbol.clone()).or_insert(0) += signed;
        self.executions.push(BrokerExecution {
            broker_order_id,
            symbol: order.symbol.clone(),
            action: order.action,
            quantity,
            price,
            executed_at: Utc::now().to_rfc3339(),
        });
    }

    fn place_order(&mut self, order: &WireOrder) -> Result<PlaceOrderAck, (String, String)> {
        let behavior = self
            .behaviors
            .get(&order.symbol)
            .cloned()
            .unwrap_or(OrderBehavior::Fill);
        let broker_order_id = self.next_broker_order_id();

        match behavior {
            OrderBehavior::Reject { code, message } => {
                self.completed_orders.push(BrokerCompletedOrder {
                    broker_order_id,
                    symbol: order.symbol.clone(),
                    action: order.action,
                    quantity: order.quantity,
                    filled_quantity: 0,
                    avg_fill_price: Decimal::ZERO,
                    raw_status: "Cancelled".to_string(),
                    error_code: Some(code.clone()),
                    error_message: message.clone(),
                });
                Err((code, message))
            }
            OrderBehavior::Hold { info_code, message } => {
                self.open_orders.push(BrokerOpenOrder {
                    broker_order_id,
                    symbol: order.symbol.clone(),
                    action: order.action,
                    quantity: order.quantity,
                    filled_quantity: 0,
                    raw_status: "PreSubmitted".to_string(),
                    info_code: Some(info_code.clone()),
                });
                Ok(PlaceOrderAck {
                    broker_order_id,
                    raw_status: "PreSubmitted".to_string(),
                    filled_quantity: 0,
                    remaining_quantity: order.quantity,
                    avg_fill_price: Decimal::ZERO,
                    info_code: Some(info_code),
                    info_message: Some(message),
                })
            }
            OrderBehavior::PartialFill(filled) => {
                let filled = filled.min(order.quantity);
                self.record_fill(order, broker_order_id, filled);
                let price = self.fill_price(&order.symbol);
                self.open_orders.push(BrokerOpenOrder {
                    broker_order_id,
                    symbol: order.symbol.clone(),
                    action: order.action,
                    quantity: order.quantity,
                    filled_quantity: filled,
                    raw_status: "Submitted".to_string(),
                    info_code: None,
                });
                Ok(PlaceOrderAck {
                    broker_order_id,
                    raw_status: "Submitted".to_string(),
                    filled_quantity: filled,
                    remaining_quantity: order.quantity - filled,
                    avg_fill_price: price,
                    info_code: None,
                    info_message: None,
                })
            }
            OrderBehavior::Fill => {
                self.record_fill(order, broker_order_id, order.quantity);
                let price = self.fill_price(&order.symbol);
                self.completed_orders.push(BrokerCompletedOrder {
                    broker_order_id,
                    symbol: order.symbol.clone(),
                    action: order.action,
                    quantity: order.quantity,
                    filled_quantity: order.quantity,
                    avg_fill_price: price,
                    raw_status: "Filled".to_string(),
                    error_code: None,
                    error_message: String::new(),
                });
                Ok(PlaceOrderAck {
                    broker_order_id,
                    raw_status: "Filled".to_string(),
                    filled_quantity: order.quantity,
                    remaining_quantity: 0,
                    avg_fill_price: price,
                    info_code: None,
                    info_message: None,
                })
            }
        }
    }

    fn match_symbols(&self, pattern: &str) -> Vec<SymbolSample> {
        let needle = pattern.to_uppercase();
        let first_word = needle.split_whitespace().next().unwrap_or("").to_string();
        self.catalog
            .iter()
            .filter(|entry| {
                let symbol = entry.instrument.symbol.to_uppercase();
                let name = entry.name.to_uppercase();
                symbol.starts_with(&needle)
                    || (!first_word.is_empty()
                        && name.split_whitespace().any(|w| w.starts_with(&first_word)))
            })
            .map(|entry| SymbolSample {
                instrument: entry.instrument.clone(),
                description: entry.name.clone(),
                country: entry.country.clone(),
            })
            .collect()
    }

    fn handle(&mut self, request: BrokerRequest) -> Result<BrokerEvent, (u64, String, String)> {
        self.request_count += 1;
        match request {
            BrokerRequest::LookupIsin { req_id, isin } => Ok(BrokerEvent::Contracts {
                req_id,
                contracts: self
                    .catalog
                    .iter()
                    .filter(|e| e.isin.as_deref() == Some(isin.as_str()))
                    .map(|e| e.instrument.clone())
                    .collect(),
            }),
            BrokerRequest::ContractDetails { req_id, symbol } => Ok(BrokerEvent::Contracts {
                req_id,
                contracts: self
                    .catalog
                    .iter()
                    .filter(|e| e.instrument.symbol == symbol)
                    .map(|e| e.instrument.clone())
                    .collect(),
            }),
            BrokerRequest::MatchSymbols { req_id, pattern } => Ok(BrokerEvent::SymbolSamples {
                req_id,
                samples: self.match_symbols(&pattern),
            }),
            BrokerRequest::PlaceOrder { req_id, order } => match self.place_order(&order) {
                Ok(ack) => Ok(BrokerEvent::OrderAck { req_id, ack }),
                Err((code, message)) => Err((req_id, code, message)),
            },
            BrokerRequest::OpenOrders { req_id } => Ok(BrokerEvent::OpenOrders {
                req_id,
                orders: self.open_orders.clone(),
            }),
            BrokerRequest::CompletedOrders { req_id } => Ok(BrokerEvent::CompletedOrders {
                req_id,
                orders: self.completed_orders.clone(),
            }),
            BrokerRequest::Executions { req_id } => Ok(BrokerEvent::Executions {
                req_id,
                executions: self.executions.clone(),
            }),
            BrokerRequest::Positions { req_id } => Ok(BrokerEvent::Positions {
                req_id,
                positions: self
                    .positions
                    .iter()
                    .map(|(symbol, quantity)| BrokerPosition {
                        symbol: symbol.clone(),
                        quantity: *quantity,
                    })
                    .collect(),
            }),
        }
    }
}

/// One row of a venue catalog file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRow {
    /// The instrument as the broker reports it.
    pub instrument: BrokerInstrument,
    /// ISIN, when the venue knows one.
    #[serde(default)]
    pub isin: Option<String>,
    /// Company name used by the fuzzy symbol search.
    pub name: String,
    /// Home country of the listing.
    pub country: String,
    /// Starting account position, zero when absent.
    #[serde(default)]
    pub position: i64,
}

/// In-memory broker venue; clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedBroker {
    state: Arc<Mutex<VenueState>>,
}

impl SimulatedBroker {
    /// Empty venue: no instruments, no positions, orders fill immediately.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a venue from a catalog JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read or parsed.
    pub fn from_catalog_file(path: &std::path::Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        let rows: Vec<CatalogRow> = serde_json::from_str(&raw)?;
        let mut venue = Self::new();
        for row in rows {
            if row.position != 0 {
                venue = venue.with_position(&row.instrument.symbol, row.position);
            }
            venue = venue.with_instrument(
                row.instrument,
                row.isin.as_deref(),
                &row.name,
                &row.country,
            );
        }
        Ok(venue)
    }

    fn with_state(self, f: impl FnOnce(&mut VenueState)) -> Self {
        if let Ok(mut state) = self.state.lock() {
            f(&mut state);
        }
        self
    }

    /// Add a catalog instrument with its identifiers.
    #[must_use]
    pub fn with_instrument(
        self,
        instrument: BrokerInstrument,
        isin: Option<&str>,
        name: &str,
        country: &str,
    ) -> Self {
        let entry = CatalogEntry {
            instrument,
            isin: isin.map(String::from),
            name: name.to_string(),
            country: country.to_string(),
        };
        self.with_state(|s| s.catalog.push(entry))
    }

    /// Seed an existing account position.
    #[must_use]
    pub fn with_position(self, symbol: &str, quantity: i64) -> Self {
        let symbol = symbol.to_string();
        self.with_state(|s| {
            s.positions.insert(symbol, quantity);
        })
    }

    /// Pin the fill price for a symbol (default 100).
    #[must_use]
    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        let symbol = symbol.to_string();
        self.with_state(|s| {
            s.prices.insert(symbol, price);
        })
    }

    /// Reject every order for `symbol` with a broker error code.
    #[must_use]
    pub fn reject_order(self, symbol: &str, code: &str, message: &str) -> Self {
        let behavior = OrderBehavior::Reject {
            code: code.to_string(),
            message: message.to_string(),
        };
        let symbol = symbol.to_string();
        self.with_state(|s| {
            s.behaviors.insert(symbol, behavior);
        })
    }

    /// Hold every order for `symbol`, acking with an informational code.
    #[must_use]
    pub fn hold_order(self, symbol: &str, info_code: &str, message: &str) -> Self {
        let behavior = OrderBehavior::Hold {
            info_code: info_code.to_string(),
            message: message.to_string(),
        };
        let symbol = symbol.to_string();
        self.with_state(|s| {
            s.behaviors.insert(symbol, behavior);
        })
    }

    /// Fill only `filled_quantity` units of each order for `symbol`.
    #[must_use]
    pub fn partial_fill(self, symbol: &str, filled_quantity: i64) -> Self {
        let behavior = OrderBehavior::PartialFill(filled_quantity);
        let symbol = symbol.to_string();
        self.with_state(|s| {
            s.behaviors.insert(symbol, behavior);
        })
    }

    /// Make every connection attempt fail.
    #[must_use]
    pub fn refuse_connections(self) -> Self {
        self.with_state(|s| s.refuse_connections = true)
    }

    /// Total requests the venue has served, across all sessions.
    #[must_use]
    pub fn request_count(&self) -> u64 {
        self.state.lock().map(|s| s.request_count).unwrap_or(0)
    }

    /// Current position for a symbol (0 when flat).
    #[must_use]
    pub fn position(&self, symbol: &str) -> i64 {
        self.state
            .lock()
            .map(|s| s.positions.get(symbol).copied().unwrap_or(0))
            .unwrap_or(0)
    }
}

#[async_trait]
impl Connector for SimulatedBroker {
    async fn connect(&self, _client_id: i32) -> Result<Box<dyn BrokerTransport>, SessionError> {
        let refused = self
            .state
            .lock()
            .map(|s| s.refuse_connections)
            .unwrap_or(true);
        if refused {
            return Err(SessionError::Disconnected);
        }
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Box::new(SimTransport {
            state: Arc::clone(&self.state),
            events_tx,
            events_rx,
        }))
    }
}

/// Transport answering requests synchronously against the shared venue.
struct SimTransport {
    state: Arc<Mutex<VenueState>>,
    events_tx: mpsc::UnboundedSender<BrokerEvent>,
    events_rx: mpsc::UnboundedReceiver<BrokerEvent>,
}

#[async_trait]
impl BrokerTransport for SimTransport {
    async fn send(&mut self, request: BrokerRequest) -> Result<(), SessionError> {
        let event = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| SessionError::Disconnected)?;
            match state.handle(request) {
                Ok(event) => event,
                Err((req_id, code, message)) => BrokerEvent::Error {
                    req_id,
                    code,
                    message,
                },
            }
        };
        self.events_tx
            .send(event)
            .map_err(|_| SessionError::Disconnected)
    }

    async fn recv(&mut self) -> Result<BrokerEvent, SessionError> {
        self.events_rx
            .recv()
            .await
            .ok_or(SessionError::Disconnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderAction;
    use crate::broker::api::{WireOrderType, WireTimeInForce};

    fn instrument(symbol: &str) -> BrokerInstrument {
        BrokerInstrument {
            broker_id: 1,
            symbol: symbol.to_string(),
            exchange: "NYSE".to_string(),
            currency: "USD".to_string(),
            tradable: true,
        }
    }

    fn market_order(symbol: &str, action: OrderAction, quantity: i64) -> WireOrder {
        WireOrder {
            client_order_id: "c-1".to_string(),
            broker_ref: 1,
            symbol: symbol.to_string(),
            action,
            quantity,
            order_type: WireOrderType::Market,
            time_in_force: WireTimeInForce::Day,
        }
    }

    #[test]
    fn fills_update_positions_and_ledgers() {
        let venue = SimulatedBroker::new()
            .with_instrument(instrument("ACME"), Some("US0001"), "Acme Corp", "US")
            .with_position("ACME", 10);

        let ack = venue
            .state
            .lock()
            .expect("lock")
            .place_order(&market_order("ACME", OrderAction::Buy, 5))
            .expect("fill");
        assert_eq!(ack.filled_quantity, 5);
        assert_eq!(venue.position("ACME"), 15);

        let state = venue.state.lock().expect("lock");
        assert_eq!(state.executions.len(), 1);
        assert_eq!(state.completed_orders.len(), 1);
        assert_eq!(state.completed_orders[0].raw_status, "Filled");
    }

    #[test]
    fn sell_fill_reduces_position() {
        let venue = SimulatedBroker::new().with_position("ACME", 10);
        venue
            .state
            .lock()
            .expect("lock")
            .place_order(&market_order("ACME", OrderAction::Sell, 4))
            .expect("fill");
        assert_eq!(venue.position("ACME"), 6);
    }

    #[test]
    fn rejection_records_completed_order_with_code() {
        let venue = SimulatedBroker::new().reject_order("ACME", "201", "margin");
        let err = venue
            .state
            .lock()
            .expect("lock")
            .place_order(&market_order("ACME", OrderAction::Buy, 5))
            .expect_err("rejected");
        assert_eq!(err.0, "201");

        let state = venue.state.lock().expect("lock");
        assert_eq!(state.completed_orders[0].error_code.as_deref(), Some("201"));
        assert!(state.executions.is_empty());
    }

    #[test]
    fn hold_leaves_order_open_with_info_code() {
        let venue = SimulatedBroker::new().hold_order("ACME", "399", "after hours");
        let ack = venue
            .state
            .lock()
            .expect("lock")
            .place_order(&market_order("ACME", OrderAction::Buy, 5))
            .expect("held, not rejected");
        assert_eq!(ack.info_code.as_deref(), Some("399"));
        assert_eq!(ack.filled_quantity, 0);

        let state = venue.state.lock().expect("lock");
        assert_eq!(state.open_orders.len(), 1);
        assert_eq!(state.open_orders[0].info_code.as_deref(), Some("399"));
    }

    #[test]
    fn partial_fill_splits_quantity() {
        let venue = SimulatedBroker::new().partial_fill("ACME", 3);
        let ack = venue
            .state
            .lock()
            .expect("lock")
            .place_order(&market_order("ACME", OrderAction::Buy, 10))
            .expect("partial");
        assert_eq!(ack.filled_quantity, 3);
        assert_eq!(ack.remaining_quantity, 7);
        assert_eq!(venue.position("ACME"), 3);
    }

    #[test]
    fn symbol_matching_is_prefix_based() {
        let venue = SimulatedBroker::new()
            .with_instrument(instrument("ACME"), None, "Acme Corp", "US")
            .with_instrument(instrument("BETA"), None, "Beta Industries", "US");

        let state = venue.state.lock().expect("lock");
        let by_symbol = state.match_symbols("AC");
        assert_eq!(by_symbol.len(), 1);
        assert_eq!(by_symbol[0].instrument.symbol, "ACME");

        let by_name = state.match_symbols("BETA INDUSTRIES");
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].instrument.symbol, "BETA");
    }
}
