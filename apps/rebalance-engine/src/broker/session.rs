//! Session actor over one broker transport.
//!
//! One task exclusively owns the transport: it forwards outbound requests
//! and dispatches inbound events to per-request oneshot completions. Callers
//! see plain async request/response methods and never touch callback state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::models::BrokerInstrument;

use super::api::{
    BrokerCompletedOrder, BrokerEvent, BrokerExecution, BrokerOpenOrder, BrokerPosition,
    BrokerRequest, BrokerTransport, PlaceOrderAck, SessionError, SymbolSample, WireOrder,
};

/// Successful payloads, one variant per request kind.
#[derive(Debug)]
enum Response {
    Contracts(Vec<BrokerInstrument>),
    SymbolSamples(Vec<SymbolSample>),
    OrderAck(PlaceOrderAck),
    OpenOrders(Vec<BrokerOpenOrder>),
    CompletedOrders(Vec<BrokerCompletedOrder>),
    Executions(Vec<BrokerExecution>),
    Positions(Vec<BrokerPosition>),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Response, SessionError>>>>>;

/// An authenticated broker session backed by an actor task.
///
/// Cloned handles share the same underlying connection; the pool hands out
/// at most one handle at a time.
pub struct BrokerSession {
    client_id: i32,
    outbound: mpsc::Sender<BrokerRequest>,
    pending: PendingMap,
    next_req_id: AtomicU64,
    healthy: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl BrokerSession {
    /// Spawn the actor task over a connected transport.
    #[must_use]
    pub fn spawn(
        client_id: i32,
        transport: Box<dyn BrokerTransport>,
        request_timeout: Duration,
    ) -> Arc<Self> {
        let (outbound_tx, outbound_rx) = mpsc::channel::<BrokerRequest>(32);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let healthy = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_actor(
            client_id,
            transport,
            outbound_rx,
            Arc::clone(&pending),
            Arc::clone(&healthy),
        ));

        Arc::new(Self {
            client_id,
            outbound: outbound_tx,
            pending,
            next_req_id: AtomicU64::new(1),
            healthy,
            request_timeout,
        })
    }

    /// Client id this session authenticated with.
    #[must_use]
    pub const fn client_id(&self) -> i32 {
        self.client_id
    }

    /// Whether the underlying transport is still usable.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    /// Look up catalog contracts by ISIN.
    pub async fn lookup_isin(&self, isin: &str) -> Result<Vec<BrokerInstrument>, SessionError> {
        let isin = isin.to_string();
        match self
            .request(|req_id| BrokerRequest::LookupIsin { req_id, isin })
            .await?
        {
            Response::Contracts(contracts) => Ok(contracts),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Fuzzy symbol search against the broker catalog.
    pub async fn match_symbols(&self, pattern: &str) -> Result<Vec<SymbolSample>, SessionError> {
        let pattern = pattern.to_string();
        match self
            .request(|req_id| BrokerRequest::MatchSymbols { req_id, pattern })
            .await?
        {
            Response::SymbolSamples(samples) => Ok(samples),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Contract details for an exact symbol.
    pub async fn contract_details(
        &self,
        symbol: &str,
    ) -> Result<Vec<BrokerInstrument>, SessionError> {
        let symbol = symbol.to_string();
        match self
            .request(|req_id| BrokerRequest::ContractDetails { req_id, symbol })
            .await?
        {
            Response::Contracts(contracts) => Ok(contracts),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Place an order; rejections arrive as `SessionError::Api`.
    pub async fn place_order(&self, order: WireOrder) -> Result<PlaceOrderAck, SessionError> {
        match self
            .request(|req_id| BrokerRequest::PlaceOrder { req_id, order })
            .await?
        {
            Response::OrderAck(ack) => Ok(ack),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Fetch currently working orders.
    pub async fn open_orders(&self) -> Result<Vec<BrokerOpenOrder>, SessionError> {
        match self
            .request(|req_id| BrokerRequest::OpenOrders { req_id })
            .await?
        {
            Response::OpenOrders(orders) => Ok(orders),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Fetch orders that reached a terminal state.
    pub async fn completed_orders(&self) -> Result<Vec<BrokerCompletedOrder>, SessionError> {
        match self
            .request(|req_id| BrokerRequest::CompletedOrders { req_id })
            .await?
        {
            Response::CompletedOrders(orders) => Ok(orders),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Fetch executions for the current day.
    pub async fn executions(&self) -> Result<Vec<BrokerExecution>, SessionError> {
        match self
            .request(|req_id| BrokerRequest::Executions { req_id })
            .await?
        {
            Response::Executions(executions) => Ok(executions),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Fetch account positions.
    pub async fn positions(&self) -> Result<Vec<BrokerPosition>, SessionError> {
        match self
            .request(|req_id| BrokerRequest::Positions { req_id })
            .await?
        {
            Response::Positions(positions) => Ok(positions),
            _ => Err(SessionError::UnexpectedResponse),
        }
    }

    /// Issue one request and await its correlated event.
    async fn request(
        &self,
        build: impl FnOnce(u64) -> BrokerRequest,
    ) -> Result<Response, SessionError> {
        if !self.is_healthy() {
            return Err(SessionError::Disconnected);
        }

        let req_id = self.next_req_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(req_id, tx);
        } else {
            return Err(SessionError::Disconnected);
        }

        if self.outbound.send(build(req_id)).await.is_err() {
            self.remove_pending(req_id);
            return Err(SessionError::Disconnected);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Err(_) => {
                self.remove_pending(req_id);
                Err(SessionError::Timeout {
                    timeout_secs: self.request_timeout.as_secs(),
                })
            }
            // Actor dropped the sender without answering
            Ok(Err(_)) => Err(SessionError::Disconnected),
            Ok(Ok(result)) => result,
        }
    }

    fn remove_pending(&self, req_id: u64) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&req_id);
        }
    }
}

impl std::fmt::Debug for BrokerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerSession")
            .field("client_id", &self.client_id)
            .field("healthy", &self.is_healthy())
            .finish_non_exhaustive()
    }
}

/// Actor loop: exclusive owner of the transport.
async fn run_actor(
    client_id: i32,
    mut transport: Box<dyn BrokerTransport>,
    mut outbound: mpsc::Receiver<BrokerRequest>,
    pending: PendingMap,
    healthy: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            request = outbound.recv() => {
                let Some(request) = request else {
                    // Session handle dropped; shut the transport task down.
                    break;
                };
                let req_id = request.req_id();
                if let Err(e) = transport.send(request).await {
                    warn!(client_id, req_id, error = %e, "transport send failed");
                    fail_session(&pending, &healthy);
                    break;
                }
            }
            event = transport.recv() => {
                match event {
                    Ok(event) => dispatch(client_id, event, &pending),
                    Err(e) => {
                        warn!(client_id, error = %e, "transport receive failed");
                        fail_session(&pending, &healthy);
                        break;
                    }
                }
            }
        }
    }
}

/// Route one event to the request awaiting it.
fn dispatch(client_id: i32, event: BrokerEvent, pending: &PendingMap) {
    let req_id = event.req_id();
    let Ok(mut map) = pending.lock() else {
        return;
    };
    let Some(tx) = map.remove(&req_id) else {
        // Caller already timed out; late events are dropped.
        debug!(client_id, req_id, "dropping event with no pending request");
        return;
    };
    drop(map);

    let result = match event {
        BrokerEvent::Contracts { contracts, .. } => Ok(Response::Contracts(contracts)),
        BrokerEvent::SymbolSamples { samples, .. } => Ok(Response::SymbolSamples(samples)),
        BrokerEvent::OrderAck { ack, .. } => Ok(Response::OrderAck(ack)),
        BrokerEvent::OpenOrders { orders, .. } => Ok(Response::OpenOrders(orders)),
        BrokerEvent::CompletedOrders { orders, .. } => Ok(Response::CompletedOrders(orders)),
        BrokerEvent::Executions { executions, .. } => Ok(Response::Executions(executions)),
        BrokerEvent::Positions { positions, .. } => Ok(Response::Positions(positions)),
        BrokerEvent::Error { code, message, .. } => Err(SessionError::Api { code, message }),
    };

    let _ = tx.send(result);
}

/// Mark the session unhealthy and fail every in-flight request.
fn fail_session(pending: &PendingMap, healthy: &AtomicBool) {
    healthy.store(false, Ordering::SeqCst);
    if let Ok(mut map) = pending.lock() {
        for (_, tx) in map.drain() {
            let _ = tx.send(Err(SessionError::Disconnected));
        }
    }
}
