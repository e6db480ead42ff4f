//! Broker connectivity: wire types, per-session actors, and the session pool.

pub mod api;
pub mod backoff;
pub mod pool;
pub mod session;
pub mod sim;

pub use api::{
    BrokerCompletedOrder, BrokerExecution, BrokerOpenOrder, BrokerPosition, Connector,
    PlaceOrderAck, SessionError, SymbolSample, WireOrder, WireOrderType, WireTimeInForce,
};
pub use backoff::ReconnectPolicy;
pub use pool::{PooledSession, PoolStats, SessionPool};
pub use session::BrokerSession;
pub use sim::{CatalogRow, SimulatedBroker};
