//! Connection Manager
//!
//! Owns the one live link to the index server. Concurrent callers that find
//! no usable link share a single connect attempt; when the link drops the
//! manager forgets it and the next caller starts a fresh attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bitcoin::Script;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::common::{log_connection_event, SyncError};
use crate::digest::ScriptHash;
use crate::electrum::UnspentEntry;

/// Capacity of the connection event channel
const EVENT_CAPACITY: usize = 64;

/// A live link to an index server
#[async_trait]
pub trait IndexConnection: Send + Sync {
    /// Unspent outputs currently locked by `script`
    async fn list_unspent(&self, script: &Script) -> Result<Vec<UnspentEntry>, SyncError>;

    /// Register for change pushes on `script`; a repeat registration is a no-op
    async fn subscribe_script(&self, script: &Script) -> Result<(), SyncError>;

    /// Drop the registration for `script`; false if it was not registered
    async fn unsubscribe_script(&self, script: &Script) -> Result<bool, SyncError>;

    /// Script hashes the server reported as changed
    fn notifications(&self) -> broadcast::Receiver<ScriptHash>;

    /// Cancelled once the link is gone
    fn closed(&self) -> CancellationToken;

    /// Tear the link down
    fn close(&self);

    fn is_closed(&self) -> bool {
        self.closed().is_cancelled()
    }
}

/// Opens new links
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn IndexConnection>, SyncError>;

    /// Human readable endpoint for logs
    fn describe(&self) -> String;
}

type ConnectResult = Result<Arc<dyn IndexConnection>, SyncError>;
type PendingConnect = Shared<BoxFuture<'static, ConnectResult>>;

enum LinkState {
    Disconnected,
    Connecting {
        attempt: u64,
        future: PendingConnect,
    },
    Connected {
        attempt: u64,
        connection: Arc<dyn IndexConnection>,
    },
}

/// Link lifecycle notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { attempt: u64 },
    Disconnected { attempt: u64 },
    ConnectFailed { attempt: u64, error: String },
}

struct ManagerInner {
    connector: Arc<dyn Connector>,
    state: Mutex<LinkState>,
    attempts: AtomicU64,
    events: broadcast::Sender<ConnectionEvent>,
}

/// Shared handle to the link; clones refer to the same link
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ManagerInner {
                connector,
                state: Mutex::new(LinkState::Disconnected),
                attempts: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Return the live link, connecting if needed
    ///
    /// Callers arriving while an attempt is in flight await that attempt and
    /// all observe its outcome.
    pub async fn get_connection(&self) -> Result<Arc<dyn IndexConnection>, SyncError> {
        let (attempt, pending) = {
            let mut state = self.inner.state.lock().await;

            let in_flight = match &*state {
                LinkState::Connected { connection, .. } if !connection.is_closed() => {
                    return Ok(Arc::clone(connection));
                }
                LinkState::Connecting { attempt, future } => Some((*attempt, future.clone())),
                _ => None,
            };

            match in_flight {
                Some(pending) => pending,
                None => {
                    // A closed link whose observer has not run yet
                    if let LinkState::Connected { attempt, .. } = &*state {
                        self.announce_disconnect(*attempt);
                    }

                    let attempt = self.inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    let connector = Arc::clone(&self.inner.connector);
                    debug!(attempt, server = %connector.describe(), "opening index connection");

                    let future = async move { connector.connect().await }.boxed().shared();
                    *state = LinkState::Connecting {
                        attempt,
                        future: future.clone(),
                    };
                    (attempt, future)
                }
            }
        };

        let result = pending.await;
        self.settle(attempt, result).await
    }

    /// Record the outcome of `attempt`
    ///
    /// Every waiter of an attempt settles it; the first one records it. If a
    /// disconnect replaced the attempt while it was in flight, a link it
    /// produced is closed rather than handed out.
    async fn settle(&self, attempt: u64, result: ConnectResult) -> ConnectResult {
        let mut state = self.inner.state.lock().await;
        match &*state {
            LinkState::Connecting { attempt: a, .. } if *a == attempt => {}
            LinkState::Connected { attempt: a, .. } if *a == attempt => return result,
            _ => {
                return match result {
                    Ok(orphan) => {
                        orphan.close();
                        Err(SyncError::connection(
                            "connect attempt abandoned by disconnect",
                        ))
                    }
                    Err(e) => Err(e),
                };
            }
        }

        let server = self.inner.connector.describe();
        match &result {
            Ok(connection) => {
                *state = LinkState::Connected {
                    attempt,
                    connection: Arc::clone(connection),
                };
                drop(state);

                self.watch_link(attempt, connection.closed());
                log_connection_event("connected", &server, attempt, None);
                let _ = self.inner.events.send(ConnectionEvent::Connected { attempt });
            }
            Err(e) => {
                *state = LinkState::Disconnected;
                drop(state);

                let error = e.to_string();
                log_connection_event("connect_failed", &server, attempt, Some(&error));
                let _ = self
                    .inner
                    .events
                    .send(ConnectionEvent::ConnectFailed { attempt, error });
            }
        }
        result
    }

    /// Reset to disconnected once the link for `attempt` closes
    fn watch_link(&self, attempt: u64, closed: CancellationToken) {
        let inner: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            closed.cancelled().await;
            if let Some(inner) = inner.upgrade() {
                ConnectionManager { inner }.reset(attempt).await;
            }
        });
    }

    async fn reset(&self, attempt: u64) {
        let mut state = self.inner.state.lock().await;
        if matches!(&*state, LinkState::Connected { attempt: a, .. } if *a == attempt) {
            *state = LinkState::Disconnected;
            drop(state);
            self.announce_disconnect(attempt);
        }
    }

    fn announce_disconnect(&self, attempt: u64) {
        log_connection_event(
            "disconnected",
            &self.inner.connector.describe(),
            attempt,
            None,
        );
        let _ = self
            .inner
            .events
            .send(ConnectionEvent::Disconnected { attempt });
    }

    /// Close the live link, if any
    ///
    /// An attempt still in flight is abandoned; the link it yields is closed.
    pub async fn disconnect(&self) {
        let previous =
            std::mem::replace(&mut *self.inner.state.lock().await, LinkState::Disconnected);
        if let LinkState::Connected {
            attempt,
            connection,
        } = previous
        {
            connection.close();
            self.announce_disconnect(attempt);
        }
    }

    pub async fn is_connected(&self) -> bool {
        matches!(
            &*self.inner.state.lock().await,
            LinkState::Connected { connection, .. } if !connection.is_closed()
        )
    }

    /// Number of connect attempts started so far
    pub fn attempts(&self) -> u64 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }
}

// ============================================================================
// Tests
// ============================================================================
