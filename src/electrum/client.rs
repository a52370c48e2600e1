//! Electrum session
//!
//! Wraps a blocking `electrum_client::Client`. Every request runs on the
//! blocking pool with a deadline. The client only reads server pushes while
//! a request is in progress, so a background task pings the server on a
//! fixed cadence and then drains each subscribed script's push queue into a
//! broadcast channel. A transport failure on any request cancels `closed`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{Script, ScriptBuf};
use electrum_client::{Client, ConfigBuilder, ElectrumApi, Param};
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::messages::{
    client_error, UnspentEntry, PROTOCOL_VERSION, SCRIPTHASH_LISTUNSPENT, SCRIPTHASH_SUBSCRIBE,
    SCRIPTHASH_UNSUBSCRIBE, SERVER_PING, SERVER_VERSION,
};
use super::url::ElectrumUrl;
use crate::common::{SyncConfig, SyncError};
use crate::connection::{Connector, IndexConnection};
use crate::digest::ScriptHash;

const NOTIFICATION_CAPACITY: usize = 256;

/// Client tunables
#[derive(Debug, Clone)]
pub struct ElectrumOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// How often queued server pushes are collected; also keeps the link alive
    pub push_poll_interval: Duration,
    /// Sent in the `server.version` handshake
    pub client_name: String,
}

impl Default for ElectrumOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            push_poll_interval: Duration::from_secs(1),
            client_name: format!("chainsync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ElectrumOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            request_timeout: config.request_timeout,
            push_poll_interval: config.push_poll_interval,
            ..Self::default()
        }
    }

    /// Socket timeout handed to the client, whole seconds in 1..=255
    fn socket_timeout_secs(&self) -> u8 {
        let secs = self.request_timeout.as_millis().div_ceil(1_000);
        u8::try_from(secs.clamp(1, 255)).unwrap_or(u8::MAX)
    }
}

/// An open, negotiated Electrum session
pub struct ElectrumConnection {
    server: String,
    client: Arc<Client>,
    /// Scripts registered for pushes on this session
    scripts: Mutex<HashMap<ScriptHash, ScriptBuf>>,
    notifications: broadcast::Sender<ScriptHash>,
    closed: CancellationToken,
    request_timeout: Duration,
}

impl std::fmt::Debug for ElectrumConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElectrumConnection")
            .field("server", &self.server)
            .field("closed", &self.closed.is_cancelled())
            .finish()
    }
}

impl ElectrumConnection {
    /// Open a session and negotiate the protocol version
    pub async fn connect(
        url: &ElectrumUrl,
        options: &ElectrumOptions,
    ) -> Result<Arc<Self>, SyncError> {
        let client = open_client(url, options).await?;
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let connection = Arc::new(Self {
            server: url.to_string(),
            client: Arc::new(client),
            scripts: Mutex::new(HashMap::new()),
            notifications,
            closed: CancellationToken::new(),
            request_timeout: options.request_timeout,
        });

        if let Err(e) = connection.negotiate(&options.client_name).await {
            connection.closed.cancel();
            return Err(e);
        }

        tokio::spawn(collect_pushes(
            Arc::downgrade(&connection),
            options.push_poll_interval,
        ));

        Ok(connection)
    }

    async fn negotiate(&self, client_name: &str) -> Result<(), SyncError> {
        let params = vec![
            Param::String(client_name.to_string()),
            Param::String(PROTOCOL_VERSION.to_string()),
        ];
        let version = self
            .blocking(SERVER_VERSION, move |client| {
                client.raw_call(SERVER_VERSION, params)
            })
            .await
            .map_err(|e| {
                SyncError::connection(format!("handshake with {} failed: {}", self.server, e))
            })?;
        debug!(server = %self.server, %version, "electrum session negotiated");
        Ok(())
    }

    /// Run one client call on the blocking pool
    ///
    /// Transport failures and deadline overruns close the session; the
    /// client cannot be trusted to be in sync with the server after either.
    async fn blocking<T, F>(&self, method: &'static str, call: F) -> Result<T, SyncError>
    where
        T: Send + 'static,
        F: FnOnce(&Client) -> Result<T, electrum_client::Error> + Send + 'static,
    {
        if self.closed.is_cancelled() {
            return Err(self.closed_error());
        }

        let client = Arc::clone(&self.client);
        let task = tokio::task::spawn_blocking(move || call(&client));

        let (error, fatal) = match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(Ok(value))) => {
                trace!(method, "request completed");
                return Ok(value);
            }
            Ok(Ok(Err(e))) => {
                let error = client_error(method, e);
                let fatal = matches!(error, SyncError::Connection(_));
                (error, fatal)
            }
            Ok(Err(join)) => (
                SyncError::connection(format!("{} worker failed: {}", method, join)),
                true,
            ),
            Err(_) => (
                SyncError::fetch(format!(
                    "{} timed out after {} ms",
                    method,
                    self.request_timeout.as_millis()
                )),
                true,
            ),
        };

        if fatal {
            warn!(server = %self.server, method, error = %error, "electrum session failed");
            self.closed.cancel();
        }
        Err(error)
    }

    fn closed_error(&self) -> SyncError {
        SyncError::connection(format!("connection to {} is closed", self.server))
    }

    /// Ping, then forward every script whose push queue is non-empty
    async fn poll_pushes(&self) -> Result<(), SyncError> {
        self.blocking(SERVER_PING, |client| client.ping()).await?;

        let watched: Vec<(ScriptHash, ScriptBuf)> = self
            .scripts
            .lock()
            .await
            .iter()
            .map(|(digest, script)| (*digest, script.clone()))
            .collect();
        if watched.is_empty() {
            return Ok(());
        }

        let changed = self
            .blocking(SCRIPTHASH_SUBSCRIBE, move |client| {
                let mut changed = Vec::new();
                for (digest, script) in watched {
                    // Drain: several pushes for one script need one refresh
                    let mut pushed = false;
                    while let Ok(Some(_)) = client.script_pop(&script) {
                        pushed = true;
                    }
                    if pushed {
                        changed.push(digest);
                    }
                }
                Ok(changed)
            })
            .await?;

        for digest in changed {
            trace!(%digest, "scripthash changed");
            let _ = self.notifications.send(digest);
        }
        Ok(())
    }
}

#[async_trait]
impl IndexConnection for ElectrumConnection {
    async fn list_unspent(&self, script: &Script) -> Result<Vec<UnspentEntry>, SyncError> {
        let script = script.to_owned();
        let unspent = self
            .blocking(SCRIPTHASH_LISTUNSPENT, move |client| {
                client.script_list_unspent(&script)
            })
            .await?;
        Ok(unspent.into_iter().map(UnspentEntry::from).collect())
    }

    async fn subscribe_script(&self, script: &Script) -> Result<(), SyncError> {
        let digest = ScriptHash::from_script(script);
        let mut scripts = self.scripts.lock().await;
        if scripts.contains_key(&digest) {
            return Ok(());
        }

        let owned = script.to_owned();
        let status = self
            .blocking(SCRIPTHASH_SUBSCRIBE, move |client| {
                client.script_subscribe(&owned)
            })
            .await?;
        scripts.insert(digest, script.to_owned());
        trace!(%digest, has_history = status.is_some(), "script subscribed");
        Ok(())
    }

    async fn unsubscribe_script(&self, script: &Script) -> Result<bool, SyncError> {
        let digest = ScriptHash::from_script(script);
        let mut scripts = self.scripts.lock().await;
        let Some(owned) = scripts.remove(&digest) else {
            return Ok(false);
        };

        self.blocking(SCRIPTHASH_UNSUBSCRIBE, move |client| {
            client.script_unsubscribe(&owned)
        })
        .await
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

impl Drop for ElectrumConnection {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn open_client(url: &ElectrumUrl, options: &ElectrumOptions) -> Result<Client, SyncError> {
    // Reconnects are the manager's job; the client must not retry on its own
    let config = ConfigBuilder::new()
        .timeout(Some(options.socket_timeout_secs()))
        .retry(0)
        .validate_domain(url.validate_domain())
        .build();

    let endpoint = url.to_string();
    let target = endpoint.clone();
    let opening = tokio::task::spawn_blocking(move || Client::from_config(&target, config));

    match tokio::time::timeout(options.connect_timeout, opening).await {
        Ok(Ok(Ok(client))) => Ok(client),
        Ok(Ok(Err(e))) => Err(SyncError::connection(format!("{}: {}", endpoint, e))),
        Ok(Err(join)) => Err(SyncError::connection(format!(
            "{}: connect worker failed: {}",
            endpoint, join
        ))),
        Err(_) => Err(SyncError::connection(format!(
            "timed out connecting to {} after {} ms",
            endpoint,
            options.connect_timeout.as_millis()
        ))),
    }
}

async fn collect_pushes(connection: Weak<ElectrumConnection>, interval: Duration) {
    let closed = match connection.upgrade() {
        Some(conn) => conn.closed.clone(),
        None => return,
    };

    loop {
        tokio::select! {
            _ = closed.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }

        let Some(conn) = connection.upgrade() else {
            return;
        };
        if let Err(e) = conn.poll_pushes().await {
            warn!(server = %conn.server, error = %e, "push poll failed, dropping connection");
            conn.closed.cancel();
            return;
        }
    }
}

// ============================================================================
// Connector
// ============================================================================

/// Opens `ElectrumConnection`s to one server
#[derive(Debug, Clone)]
pub struct ElectrumConnector {
    url: ElectrumUrl,
    options: ElectrumOptions,
}

impl ElectrumConnector {
    pub fn new(url: ElectrumUrl, options: ElectrumOptions) -> Self {
        Self { url, options }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.electrum_url.clone(),
            ElectrumOptions::from_config(config),
        )
    }
}

#[async_trait]
impl Connector for ElectrumConnector {
    async fn connect(&self) -> Result<Arc<dyn IndexConnection>, SyncError> {
        let connection = ElectrumConnection::connect(&self.url, &self.options).await?;
        Ok(connection as Arc<dyn IndexConnection>)
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}
