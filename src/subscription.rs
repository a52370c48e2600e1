//! Address Subscriptions
//!
//! A subscription delivers the full unspent set of an address once up front
//! and again after every server push for its script hash. If the link drops
//! the subscription reconnects, re-registers and refreshes on its own.
//!
//! Several subscriptions may follow the same address. The registry counts
//! them per script hash and only the last one to leave drops the server-side
//! registration. Registration changes are serialized under one lock so a
//! leaving subscriber cannot undo a registration made by one arriving.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::{generate_correlation_id, log_subscription_event, SyncError};
use crate::connection::{ConnectionManager, IndexConnection};
use crate::digest::{AddressDigest, ScriptHash};
use crate::query::UtxoQuery;
use crate::types::Utxo;

type UpdateHandler = Arc<dyn Fn(Vec<Utxo>) + Send + Sync>;

struct RegistryInner {
    query: UtxoQuery,
    connections: ConnectionManager,
    /// Live subscriptions per script hash
    registrations: Mutex<HashMap<ScriptHash, usize>>,
    resubscribe_delay: Duration,
    shutdown: CancellationToken,
}

impl RegistryInner {
    /// Register one more subscriber for `digest` on `connection`
    async fn register(
        &self,
        connection: &Arc<dyn IndexConnection>,
        digest: &AddressDigest,
    ) -> Result<(), SyncError> {
        let mut registrations = self.registrations.lock().await;
        connection.subscribe_script(digest.script()).await?;
        *registrations.entry(digest.hash()).or_insert(0) += 1;
        Ok(())
    }

    /// Re-issue the server registration on a fresh link
    async fn renew(
        &self,
        connection: &Arc<dyn IndexConnection>,
        digest: &AddressDigest,
    ) -> Result<(), SyncError> {
        let _registrations = self.registrations.lock().await;
        connection.subscribe_script(digest.script()).await
    }

    /// Drop one subscriber; the last one out unregisters on the server
    async fn release(&self, connection: &Arc<dyn IndexConnection>, digest: &AddressDigest) {
        let mut registrations = self.registrations.lock().await;
        let remaining = match registrations.get_mut(&digest.hash()) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining > 0 {
            return;
        }

        registrations.remove(&digest.hash());
        if connection.is_closed() {
            return;
        }
        if let Err(e) = connection.unsubscribe_script(digest.script()).await {
            debug!(digest = %digest.hash(), error = %e, "server-side unsubscribe failed");
        }
    }
}

/// Tracks live subscriptions
#[derive(Clone)]
pub struct SubscriptionRegistry {
    inner: Arc<RegistryInner>,
}

/// Handle to one subscription
#[derive(Debug)]
pub struct Subscription {
    id: String,
    address: String,
    digest: ScriptHash,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn digest(&self) -> &ScriptHash {
        &self.digest
    }

    /// Stop delivering updates; safe to call more than once
    pub fn unsubscribe(&self) {
        if !self.cancel.is_cancelled() {
            debug!(subscription = %self.id, "unsubscribe requested");
            self.cancel.cancel();
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

impl SubscriptionRegistry {
    pub fn new(
        query: UtxoQuery,
        connections: ConnectionManager,
        resubscribe_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                query,
                connections,
                registrations: Mutex::new(HashMap::new()),
                resubscribe_delay,
                shutdown,
            }),
        }
    }

    /// Follow `address`, calling `on_update` with its full unspent set
    ///
    /// The server registration is made first. `on_update` is then called
    /// with the current set before this returns, so an `Err` means the
    /// handler was never called. Later calls run on a background task, one
    /// at a time, and stop once the subscription is cancelled.
    pub async fn subscribe<F>(&self, address: &str, on_update: F) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Utxo>) + Send + Sync + 'static,
    {
        let digest = AddressDigest::parse(address, self.inner.query.network())?;
        let handler: UpdateHandler = Arc::new(on_update);

        // Listen before registering so a change in between is not missed
        let connection = self.inner.connections.get_connection().await?;
        let notifications = connection.notifications();
        self.inner.register(&connection, &digest).await?;

        let utxos = match self.inner.query.fetch_digest(&digest).await {
            Ok(utxos) => utxos,
            Err(e) => {
                self.inner.release(&connection, &digest).await;
                return Err(e);
            }
        };
        handler(utxos);

        let id = generate_correlation_id();
        let cancel = self.inner.shutdown.child_token();
        log_subscription_event("subscribed", &id, address);

        let hash = digest.hash();
        let follower = Follower {
            inner: self.inner.clone(),
            id: id.clone(),
            address: address.to_string(),
            digest,
            handler,
            cancel: cancel.clone(),
        };
        tokio::spawn(follower.run(connection, notifications));

        Ok(Subscription {
            id,
            address: address.to_string(),
            digest: hash,
            cancel,
        })
    }

    /// Subscriptions that still hold a registration
    pub async fn active_count(&self) -> usize {
        self.inner.registrations.lock().await.values().sum()
    }
}

/// Background half of a subscription
struct Follower {
    inner: Arc<RegistryInner>,
    id: String,
    address: String,
    digest: AddressDigest,
    handler: UpdateHandler,
    cancel: CancellationToken,
}

impl Follower {
    async fn run(
        self,
        mut connection: Arc<dyn IndexConnection>,
        mut notifications: broadcast::Receiver<ScriptHash>,
    ) {
        let hash = self.digest.hash();
        'session: loop {
            let closed = connection.closed();
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'session,
                    _ = closed.cancelled() => break,
                    received = notifications.recv() => match received {
                        Ok(digest) if digest == hash => self.refresh().await,
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(subscription = %self.id, skipped, "notifications lagged");
                            self.refresh().await;
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }

            warn!(subscription = %self.id, "index connection lost, resubscribing");
            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'session,
                    _ = tokio::time::sleep(self.inner.resubscribe_delay) => {}
                }

                match self.resubscribe().await {
                    Ok((fresh, receiver)) => {
                        connection = fresh;
                        notifications = receiver;
                        break;
                    }
                    Err(e) => warn!(subscription = %self.id, error = %e, "resubscribe failed"),
                }
            }

            // Pushes sent while we were away are gone
            self.refresh().await;
        }

        self.inner.release(&connection, &self.digest).await;
        log_subscription_event("unsubscribed", &self.id, &self.address);
    }

    async fn resubscribe(
        &self,
    ) -> Result<(Arc<dyn IndexConnection>, broadcast::Receiver<ScriptHash>), SyncError> {
        let connection = self.inner.connections.get_connection().await?;
        let notifications = connection.notifications();
        self.inner.renew(&connection, &self.digest).await?;
        debug!(subscription = %self.id, "resubscribed");
        Ok((connection, notifications))
    }

    async fn refresh(&self) {
        match self.inner.query.fetch_digest(&self.digest).await {
            Ok(utxos) => {
                if self.cancel.is_cancelled() {
                    return;
                }
                (self.handler)(utxos);
            }
            Err(e) => warn!(subscription = %self.id, error = %e, "refresh failed"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
