//! Wire-level types for the broker's message-oriented API.
//!
//! The broker protocol is request/callback: every request carries a request
//! id and the broker answers with one event tagged with the same id, or an
//! error event carrying a numeric code. The session actor
//! ([`super::BrokerSession`]) correlates the two; nothing outside the broker
//! module touches raw events.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{BrokerInstrument, OrderAction};

/// Failures of a single session request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// No callback arrived within the request timeout.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured request timeout in seconds.
        timeout_secs: u64,
    },

    /// The session's transport is gone; the session is unhealthy.
    #[error("session disconnected")]
    Disconnected,

    /// The broker answered with an error event.
    #[error("broker error {code}: {message}")]
    Api {
        /// Raw broker error code.
        code: String,
        /// Raw broker error message.
        message: String,
    },

    /// The broker answered with an event of the wrong kind.
    #[error("unexpected response kind for request")]
    UnexpectedResponse,
}

/// Requests the engine can put on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerRequest {
    /// Look up catalog contracts by ISIN.
    LookupIsin {
        /// Correlation id.
        req_id: u64,
        /// ISIN to look up.
        isin: String,
    },
    /// Fuzzy symbol search against the broker catalog.
    MatchSymbols {
        /// Correlation id.
        req_id: u64,
        /// Search pattern (symbol prefix or name token).
        pattern: String,
    },
    /// Contract details for an exact symbol.
    ContractDetails {
        /// Correlation id.
        req_id: u64,
        /// Exact broker symbol.
        symbol: String,
    },
    /// Place an order.
    PlaceOrder {
        /// Correlation id.
        req_id: u64,
        /// The wire order.
        order: WireOrder,
    },
    /// Fetch currently working orders.
    OpenOrders {
        /// Correlation id.
        req_id: u64,
    },
    /// Fetch orders that reached a terminal state.
    CompletedOrders {
        /// Correlation id.
        req_id: u64,
    },
    /// Fetch executions for the current day.
    Executions {
        /// Correlation id.
        req_id: u64,
    },
    /// Fetch account positions.
    Positions {
        /// Correlation id.
        req_id: u64,
    },
}

impl BrokerRequest {
    /// Correlation id of this request.
    #[must_use]
    pub const fn req_id(&self) -> u64 {
        match self {
            Self::LookupIsin { req_id, .. }
            | Self::MatchSymbols { req_id, .. }
            | Self::ContractDetails { req_id, .. }
            | Self::PlaceOrder { req_id, .. }
            | Self::OpenOrders { req_id }
            | Self::CompletedOrders { req_id }
            | Self::Executions { req_id }
            | Self::Positions { req_id } => *req_id,
        }
    }
}

/// Order type on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireOrderType {
    /// Execute at best available price.
    Market,
    /// Execute at the next session open.
    MarketOnOpen,
}

/// Time in force on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WireTimeInForce {
    /// Valid for the current trading day.
    Day,
    /// Good until cancelled.
    Gtc,
}

/// A fully specified broker order ready for submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOrder {
    /// Client-side order id (UUID), echoed by the broker.
    pub client_order_id: String,
    /// Broker-native contract identifier.
    pub broker_ref: i64,
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Unsigned share quantity.
    pub quantity: i64,
    /// Order type.
    pub order_type: WireOrderType,
    /// Time in force.
    pub time_in_force: WireTimeInForce,
}

/// Broker acknowledgement of a placed order.
///
/// Informational holds (held until session open, locate pending) arrive as
/// an acknowledgement carrying `info_code`, not as an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrderAck {
    /// Broker-assigned order id.
    pub broker_order_id: i64,
    /// Raw broker status, verbatim.
    pub raw_status: String,
    /// Filled quantity at acknowledgement time.
    pub filled_quantity: i64,
    /// Remaining quantity.
    pub remaining_quantity: i64,
    /// Average fill price, zero when nothing filled yet.
    pub avg_fill_price: Decimal,
    /// Informational broker code attached to the acknowledgement.
    pub info_code: Option<String>,
    /// Informational broker message.
    pub info_message: Option<String>,
}

/// One sample from the broker's fuzzy symbol search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSample {
    /// The catalog instrument.
    pub instrument: BrokerInstrument,
    /// Issuer name / instrument description.
    pub description: String,
    /// Listing country (ISO 3166 alpha-2).
    pub country: String,
}

/// A currently working order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerOpenOrder {
    /// Broker order id.
    pub broker_order_id: i64,
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Requested quantity.
    pub quantity: i64,
    /// Filled quantity so far.
    pub filled_quantity: i64,
    /// Raw broker status, verbatim.
    pub raw_status: String,
    /// Informational hold code, when the order is parked.
    pub info_code: Option<String>,
}

/// A terminal-state order as reported by the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerCompletedOrder {
    /// Broker order id.
    pub broker_order_id: i64,
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Requested quantity.
    pub quantity: i64,
    /// Filled quantity.
    pub filled_quantity: i64,
    /// Average fill price.
    pub avg_fill_price: Decimal,
    /// Raw broker status, verbatim.
    pub raw_status: String,
    /// Broker error code when the order failed.
    pub error_code: Option<String>,
    /// Broker error message when the order failed.
    pub error_message: String,
}

/// One execution (fill) report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerExecution {
    /// Broker order id the fill belongs to.
    pub broker_order_id: i64,
    /// Broker symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: OrderAction,
    /// Filled share quantity.
    pub quantity: i64,
    /// Fill price.
    pub price: Decimal,
    /// Execution timestamp (RFC 3339).
    pub executed_at: String,
}

/// An account position as reported by the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Broker symbol.
    pub symbol: String,
    /// Held share quantity (negative when short).
    pub quantity: i64,
}

/// Events delivered by the broker, tagged with the request id they answer.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Contract list answering an ISIN lookup or contract-details request.
    Contracts {
        /// Correlation id.
        req_id: u64,
        /// Matching catalog contracts.
        contracts: Vec<BrokerInstrument>,
    },
    /// Samples answering a symbol search.
    SymbolSamples {
        /// Correlation id.
        req_id: u64,
        /// Matching samples.
        samples: Vec<SymbolSample>,
    },
    /// Acknowledgement answering an order placement.
    OrderAck {
        /// Correlation id.
        req_id: u64,
        /// The acknowledgement.
        ack: PlaceOrderAck,
    },
    /// Open orders list.
    OpenOrders {
        /// Correlation id.
        req_id: u64,
        /// Working orders.
        orders: Vec<BrokerOpenOrder>,
    },
    /// Completed orders list.
    CompletedOrders {
        /// Correlation id.
        req_id: u64,
        /// Terminal-state orders.
        orders: Vec<BrokerCompletedOrder>,
    },
    /// Executions list.
    Executions {
        /// Correlation id.
        req_id: u64,
        /// Fill reports.
        executions: Vec<BrokerExecution>,
    },
    /// Positions list.
    Positions {
        /// Correlation id.
        req_id: u64,
        /// Account positions.
        positions: Vec<BrokerPosition>,
    },
    /// Error event answering any request.
    Error {
        /// Correlation id.
        req_id: u64,
        /// Raw broker error code.
        code: String,
        /// Raw broker error message.
        message: String,
    },
}

impl BrokerEvent {
    /// Correlation id of this event.
    #[must_use]
    pub const fn req_id(&self) -> u64 {
        match self {
            Self::Contracts { req_id, .. }
            | Self::SymbolSamples { req_id, .. }
            | Self::OrderAck { req_id, .. }
            | Self::OpenOrders { req_id, .. }
            | Self::CompletedOrders { req_id, .. }
            | Self::Executions { req_id, .. }
            | Self::Positions { req_id, .. }
            | Self::Error { req_id, .. } => *req_id,
        }
    }
}

/// A connected, message-oriented broker transport.
///
/// One transport is exclusively owned by one session actor task; it is
/// never shared.
#[async_trait]
pub trait BrokerTransport: Send {
    /// Put a request on the wire.
    async fn send(&mut self, request: BrokerRequest) -> Result<(), SessionError>;

    /// Await the next broker event.
    async fn recv(&mut self) -> Result<BrokerEvent, SessionError>;
}

/// Opens broker transports. Only the session pool calls this.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a transport authenticated with the given client id.
    async fn connect(&self, client_id: i32) -> Result<Box<dyn BrokerTransport>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_event_ids_align() {
        let request = BrokerRequest::OpenOrders { req_id: 7 };
        assert_eq!(request.req_id(), 7);

        let event = BrokerEvent::Error {
            req_id: 7,
            code: "203".to_string(),
            message: "restricted".to_string(),
        };
        assert_eq!(event.req_id(), 7);
    }

    #[test]
    fn session_error_messages() {
        let err = SessionError::Api {
            code: "201".to_string(),
            message: "margin".to_string(),
        };
        assert_eq!(err.to_string(), "broker error 201: margin");

        let err = SessionError::Timeout { timeout_secs: 4 };
        assert_eq!(err.to_string(), "request timed out after 4s");
    }
}
