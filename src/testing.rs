//! In-memory index server used by unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::Script;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use crate::common::SyncError;
use crate::connection::{Connector, IndexConnection};
use crate::digest::ScriptHash;
use crate::electrum::UnspentEntry;

/// Chain state shared by every fake connection
#[derive(Default)]
pub(crate) struct FakeChain {
    unspent: Mutex<HashMap<ScriptHash, Vec<UnspentEntry>>>,
    failures: Mutex<VecDeque<SyncError>>,
    subscribe_failures: Mutex<VecDeque<SyncError>>,
    list_calls: AtomicUsize,
}

impl FakeChain {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn set_unspent(&self, digest: ScriptHash, entries: Vec<UnspentEntry>) {
        self.unspent.lock().unwrap().insert(digest, entries);
    }

    /// Make the next `list_unspent` fail with `error`
    pub(crate) fn fail_next(&self, error: SyncError) {
        self.failures.lock().unwrap().push_back(error);
    }

    /// Make the next `subscribe_script` fail with `error`
    pub(crate) fn reject_next_subscribe(&self, error: SyncError) {
        self.subscribe_failures.lock().unwrap().push_back(error);
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

pub(crate) fn entry(txid: &str, value: u64, height: i64) -> UnspentEntry {
    UnspentEntry {
        tx_hash: txid.to_string(),
        tx_pos: 0,
        value,
        height,
    }
}

pub(crate) struct FakeConnection {
    chain: Arc<FakeChain>,
    notifications: broadcast::Sender<ScriptHash>,
    closed: CancellationToken,
    subscribed: Mutex<Vec<ScriptHash>>,
    unsubscribed: Mutex<Vec<ScriptHash>>,
    /// Server-side registrations as the index sees them
    registered: Mutex<HashSet<ScriptHash>>,
    subscribe_gate: Mutex<Option<Arc<Notify>>>,
    held_subscribes: AtomicUsize,
}

impl FakeConnection {
    fn new(chain: Arc<FakeChain>) -> Self {
        let (notifications, _) = broadcast::channel(16);
        Self {
            chain,
            notifications,
            closed: CancellationToken::new(),
            subscribed: Mutex::new(Vec::new()),
            unsubscribed: Mutex::new(Vec::new()),
            registered: Mutex::new(HashSet::new()),
            subscribe_gate: Mutex::new(None),
            held_subscribes: AtomicUsize::new(0),
        }
    }

    /// Push a change notification as the server would
    pub(crate) fn notify(&self, digest: ScriptHash) {
        let _ = self.notifications.send(digest);
    }

    pub(crate) fn subscribed(&self) -> Vec<ScriptHash> {
        self.subscribed.lock().unwrap().clone()
    }

    pub(crate) fn unsubscribed(&self) -> Vec<ScriptHash> {
        self.unsubscribed.lock().unwrap().clone()
    }

    pub(crate) fn is_registered(&self, digest: &ScriptHash) -> bool {
        self.registered.lock().unwrap().contains(digest)
    }

    /// Hold the next `subscribe_script` until the returned gate is notified
    pub(crate) fn hold_next_subscribe(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.subscribe_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Subscribe calls currently parked on a gate
    pub(crate) fn held_subscribes(&self) -> usize {
        self.held_subscribes.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.closed.is_cancelled() {
            return Err(SyncError::connection("fake link closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl IndexConnection for FakeConnection {
    async fn list_unspent(&self, script: &Script) -> Result<Vec<UnspentEntry>, SyncError> {
        self.ensure_open()?;
        let digest = ScriptHash::from_script(script);
        self.chain.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.chain.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self
            .chain
            .unspent
            .lock()
            .unwrap()
            .get(&digest)
            .cloned()
            .unwrap_or_default())
    }

    async fn subscribe_script(&self, script: &Script) -> Result<(), SyncError> {
        self.ensure_open()?;
        let gate = self.subscribe_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.held_subscribes.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            self.held_subscribes.fetch_sub(1, Ordering::SeqCst);
            self.ensure_open()?;
        }
        if let Some(error) = self.chain.subscribe_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let digest = ScriptHash::from_script(script);
        self.subscribed.lock().unwrap().push(digest);
        self.registered.lock().unwrap().insert(digest);
        Ok(())
    }

    async fn unsubscribe_script(&self, script: &Script) -> Result<bool, SyncError> {
        self.ensure_open()?;
        let digest = ScriptHash::from_script(script);
        self.unsubscribed.lock().unwrap().push(digest);
        Ok(self.registered.lock().unwrap().remove(&digest))
    }

    fn notifications(&self) -> broadcast::Receiver<ScriptHash> {
        self.notifications.subscribe()
    }

    fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }

    fn close(&self) {
        self.closed.cancel();
    }
}

/// Connector handing out `FakeConnection`s over one `FakeChain`
pub(crate) struct FakeConnector {
    chain: Arc<FakeChain>,
    delay: Duration,
    failures_remaining: AtomicU64,
    attempts: AtomicUsize,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
}

impl FakeConnector {
    pub(crate) fn new(chain: Arc<FakeChain>) -> Arc<Self> {
        Arc::new(Self {
            chain,
            delay: Duration::ZERO,
            failures_remaining: AtomicU64::new(0),
            attempts: AtomicUsize::new(0),
            connections: Mutex::new(Vec::new()),
        })
    }

    fn reconfigure(self: Arc<Self>, apply: impl FnOnce(&mut Self)) -> Arc<Self> {
        let mut this = Arc::try_unwrap(self)
            .ok()
            .expect("configure the connector before sharing it");
        apply(&mut this);
        Arc::new(this)
    }

    /// Each connect waits `delay` before resolving
    pub(crate) fn with_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        self.reconfigure(|c| c.delay = delay)
    }

    /// The first `count` connects are refused
    pub(crate) fn with_failures(self: Arc<Self>, count: u64) -> Arc<Self> {
        self.reconfigure(|c| c.failures_remaining = AtomicU64::new(count))
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Link opened by the `index`th successful connect
    pub(crate) fn link(&self, index: usize) -> Arc<FakeConnection> {
        self.connections.lock().unwrap()[index].clone()
    }

    /// Links handed out and not yet closed
    pub(crate) fn open_links(&self) -> usize {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }

    /// Most recently opened link
    pub(crate) fn latest(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection opened yet")
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Arc<dyn IndexConnection>, SyncError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let refused = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(SyncError::connection("connection refused"));
        }

        let connection = Arc::new(FakeConnection::new(self.chain.clone()));
        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection as Arc<dyn IndexConnection>)
    }

    fn describe(&self) -> String {
        "fake://index".to_string()
    }
}
