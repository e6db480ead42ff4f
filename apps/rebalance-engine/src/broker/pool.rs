//! Bounded pool of broker sessions with automatic reconnection.
//!
//! Each slot holds one session under a fixed client id. Acquisition is
//! semaphore-gated with a timeout; returning a guard either frees the slot
//! or, when the session went unhealthy, kicks off a backoff reconnect.

use std::collections::VecDeque;
use std::ops::Deref;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{mpsc, RwLock, Semaphore};
use tracing::{error, info, warn};

use crate::config::BrokerConfig;
use crate::error::EngineError;

use super::api::Connector;
use super::backoff::ReconnectPolicy;
use super::session::BrokerSession;

/// One pool slot with its permanent client id.
struct Slot {
    client_id: i32,
    session: RwLock<Option<Arc<BrokerSession>>>,
}

struct PoolInner {
    slots: Vec<Slot>,
    free: Mutex<VecDeque<usize>>,
    permits: Semaphore,
    returns: mpsc::UnboundedSender<usize>,
    connector: Arc<dyn Connector>,
    config: BrokerConfig,
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured slot count.
    pub total: usize,
    /// Slots currently acquirable.
    pub available: usize,
}

/// Fixed-size session pool.
pub struct SessionPool {
    inner: Arc<PoolInner>,
}

impl SessionPool {
    /// Build the pool and connect every slot.
    ///
    /// Succeeds as long as at least one slot connects; failed slots keep
    /// reconnecting in the background.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BrokerUnavailable`] when no slot connects.
    pub async fn connect(
        connector: Arc<dyn Connector>,
        config: BrokerConfig,
    ) -> Result<Self, EngineError> {
        let pool_size = config.pool_size;
        let slots: Vec<Slot> = (0..pool_size)
            .map(|i| Slot {
                client_id: config.base_client_id + i32::try_from(i).unwrap_or(i32::MAX),
                session: RwLock::new(None),
            })
            .collect();

        let (returns_tx, returns_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(PoolInner {
            slots,
            free: Mutex::new(VecDeque::with_capacity(pool_size)),
            permits: Semaphore::new(0),
            returns: returns_tx,
            connector,
            config,
        });

        let mut connected = 0usize;
        for idx in 0..pool_size {
            let client_id = inner.slots[idx].client_id;
            match inner.connector.connect(client_id).await {
                Ok(transport) => {
                    let session =
                        BrokerSession::spawn(client_id, transport, inner.config.request_timeout());
                    *inner.slots[idx].session.write().await = Some(session);
                    push_free(&inner, idx);
                    connected += 1;
                }
                Err(e) => {
                    warn!(client_id, error = %e, "initial session connect failed, retrying in background");
                    spawn_reconnect(Arc::downgrade(&inner), idx);
                }
            }
        }

        if connected == 0 {
            return Err(EngineError::BrokerUnavailable {
                reason: format!("none of {pool_size} sessions could connect"),
            });
        }
        info!(connected, pool_size, "session pool ready");

        tokio::spawn(run_maintenance(Arc::downgrade(&inner), returns_rx));

        Ok(Self { inner })
    }

    /// Acquire a session, waiting up to the configured acquire timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::BrokerUnavailable`] when every slot stays busy
    /// or disconnected past the timeout.
    pub async fn acquire(&self) -> Result<PooledSession, EngineError> {
        let timeout = self.inner.config.acquire_timeout();
        let permit = tokio::time::timeout(timeout, self.inner.permits.acquire())
            .await
            .map_err(|_| EngineError::BrokerUnavailable {
                reason: format!("no session free within {}s", timeout.as_secs()),
            })?
            .map_err(|_| EngineError::BrokerUnavailable {
                reason: "session pool shut down".to_string(),
            })?;
        // The slot index travels with the guard, not the permit.
        permit.forget();

        let idx = {
            let mut free = self
                .inner
                .free
                .lock()
                .map_err(|_| EngineError::BrokerUnavailable {
                    reason: "session pool poisoned".to_string(),
                })?;
            free.pop_front()
        };
        let Some(idx) = idx else {
            return Err(EngineError::BrokerUnavailable {
                reason: "free-list empty despite available permit".to_string(),
            });
        };

        let session = self.inner.slots[idx].session.read().await.clone();
        let Some(session) = session else {
            // Slot raced into reconnect; hand it back to maintenance.
            let _ = self.inner.returns.send(idx);
            return Err(EngineError::BrokerUnavailable {
                reason: "acquired slot lost its session".to_string(),
            });
        };

        Ok(PooledSession {
            session,
            slot: idx,
            returns: self.inner.returns.clone(),
        })
    }

    /// Current occupancy.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.inner.slots.len(),
            available: self.inner.permits.available_permits(),
        }
    }
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("SessionPool")
            .field("total", &stats.total)
            .field("available", &stats.available)
            .finish()
    }
}

/// RAII guard over an acquired session; returning it is just dropping it.
pub struct PooledSession {
    session: Arc<BrokerSession>,
    slot: usize,
    returns: mpsc::UnboundedSender<usize>,
}

impl Deref for PooledSession {
    type Target = BrokerSession;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        // Maintenance task decides between freeing and reconnecting.
        let _ = self.returns.send(self.slot);
    }
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("slot", &self.slot)
            .field("client_id", &self.session.client_id())
            .finish()
    }
}

fn push_free(inner: &Arc<PoolInner>, idx: usize) {
    if let Ok(mut free) = inner.free.lock() {
        free.push_back(idx);
        inner.permits.add_permits(1);
    }
}

/// Process returned slots: healthy sessions go back on the free list,
/// broken ones enter the reconnect path.
async fn run_maintenance(inner: Weak<PoolInner>, mut returns: mpsc::UnboundedReceiver<usize>) {
    while let Some(idx) = returns.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let healthy = inner.slots[idx]
            .session
            .read()
            .await
            .as_ref()
            .is_some_and(|s| s.is_healthy());
        if healthy {
            push_free(&inner, idx);
        } else {
            let client_id = inner.slots[idx].client_id;
            warn!(client_id, "session unhealthy on return, reconnecting");
            *inner.slots[idx].session.write().await = None;
            spawn_reconnect(Arc::downgrade(&inner), idx);
        }
    }
}

fn spawn_reconnect(inner: Weak<PoolInner>, idx: usize) {
    tokio::spawn(reconnect_slot(inner, idx));
}

/// Reconnect one slot with backoff until it succeeds or attempts run out.
async fn reconnect_slot(inner: Weak<PoolInner>, idx: usize) {
    let Some(strong) = inner.upgrade() else {
        return;
    };
    let mut policy = ReconnectPolicy::new(
        strong.config.reconnect_initial_backoff(),
        strong.config.reconnect_max_backoff(),
        2.0,
        strong.config.max_reconnect_attempts,
    );
    let client_id = strong.slots[idx].client_id;
    drop(strong);

    while let Some(delay) = policy.next_backoff() {
        tokio::time::sleep(delay).await;
        let Some(strong) = inner.upgrade() else {
            return;
        };
        match strong.connector.connect(client_id).await {
            Ok(transport) => {
                let session =
                    BrokerSession::spawn(client_id, transport, strong.config.request_timeout());
                *strong.slots[idx].session.write().await = Some(session);
                push_free(&strong, idx);
                info!(client_id, attempt = policy.current_attempt(), "session reconnected");
                return;
            }
            Err(e) => {
                warn!(client_id, attempt = policy.current_attempt(), error = %e, "reconnect attempt failed");
            }
        }
    }
    error!(client_id, "reconnect attempts exhausted, slot stays offline");
}
