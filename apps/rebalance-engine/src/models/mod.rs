//! Core data model for the rebalancing engine.
//!
//! Types here are plain data: created once per run, serialized into the
//! persisted run artifacts, and free of broker I/O. All timestamps are
//! RFC 3339 strings in UTC.

mod asset;
mod instrument;
mod order;
mod position;

pub use asset::{Asset, TargetAllocation};
pub use instrument::{BrokerInstrument, RejectedCandidate, ResolutionMethod, ResolutionRecord};
pub use order::{
    Order, OrderAction, OrderStatus, OrderStatusRecord, OrderTransitionError,
};
pub use position::PositionSnapshot;
