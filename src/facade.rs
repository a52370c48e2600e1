//! Chain Sync Facade
//!
//! `ChainSync` is the public surface of the engine. It owns the shared
//! connection, the subscription registry and a shutdown token that every
//! watcher and subscription it starts is tied to.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::common::{SyncConfig, SyncError};
use crate::connection::{ConnectionEvent, ConnectionManager, Connector};
use crate::digest::ScriptHash;
use crate::electrum::ElectrumConnector;
use crate::explorer::ExplorerLinks;
use crate::faucet::{FaucetClient, FaucetReceipt};
use crate::funding::{FundingHandle, FundingRequest, FundingWatcher};
use crate::query::{UtxoQuery, UtxoSource};
use crate::subscription::{Subscription, SubscriptionRegistry};
use crate::types::{FundingStatus, Utxo, UtxoTotals};

/// Entry point for address queries, subscriptions and funding watches
pub struct ChainSync {
    config: SyncConfig,
    connections: ConnectionManager,
    query: UtxoQuery,
    subscriptions: SubscriptionRegistry,
    explorer: ExplorerLinks,
    faucet: Option<FaucetClient>,
    shutdown: CancellationToken,
}

impl ChainSync {
    /// Engine talking to the configured Electrum server
    ///
    /// Nothing connects until the first request.
    pub fn new(config: SyncConfig) -> Self {
        let connector = ElectrumConnector::from_config(&config);
        Self::with_connector(config, Arc::new(connector))
    }

    /// Engine over an arbitrary connector
    pub fn with_connector(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        let shutdown = CancellationToken::new();
        let connections = ConnectionManager::new(connector);
        let query = UtxoQuery::new(connections.clone(), config.network);
        let subscriptions = SubscriptionRegistry::new(
            query.clone(),
            connections.clone(),
            config.resubscribe_delay,
            shutdown.clone(),
        );

        Self {
            explorer: ExplorerLinks::from_config(&config),
            faucet: config.faucet_url.as_deref().map(FaucetClient::new),
            config,
            connections,
            query,
            subscriptions,
            shutdown,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    /// Current unspent outputs of `address`
    pub async fn fetch_utxos(&self, address: &str) -> Result<Vec<Utxo>, SyncError> {
        self.query.fetch(address).await
    }

    pub async fn fetch_balance(&self, address: &str) -> Result<UtxoTotals, SyncError> {
        self.query.balance(address).await
    }

    /// Follow `address`; `on_update` sees the current set before this returns
    pub async fn subscribe_to_address<F>(
        &self,
        address: &str,
        on_update: F,
    ) -> Result<Subscription, SyncError>
    where
        F: Fn(Vec<Utxo>) + Send + Sync + 'static,
    {
        self.subscriptions.subscribe(address, on_update).await
    }

    /// Funding request with the configured cadence, deadline and policy
    pub fn funding_request(&self, address: &str, required_amount: u64) -> FundingRequest {
        FundingRequest::from_config(address, required_amount, &self.config)
    }

    /// Start a stoppable funding watch
    ///
    /// The address is checked here so a typo fails immediately rather than as
    /// a terminal status.
    pub fn watch_funding(&self, request: FundingRequest) -> Result<FundingHandle, SyncError> {
        ScriptHash::from_address(&request.address, self.config.network)?;
        info!(
            address = %request.address,
            required = request.required_amount,
            policy = %request.policy,
            "starting funding watch"
        );

        let source: Arc<dyn UtxoSource> = Arc::new(self.query.clone());
        Ok(FundingWatcher::spawn(source, request, self.shutdown.child_token()))
    }

    /// Wait until `address` holds `required_amount`
    ///
    /// Every status, the terminal one included, goes to `on_update` in order.
    /// Ok carries the Confirmed status, Err the Timeout or Error status.
    pub async fn poll_for_funding<F>(
        &self,
        address: &str,
        required_amount: u64,
        on_update: F,
        timeout: Duration,
    ) -> Result<FundingStatus, FundingStatus>
    where
        F: FnMut(&FundingStatus),
    {
        let request = self
            .funding_request(address, required_amount)
            .with_timeout(timeout);
        let source: Arc<dyn UtxoSource> = Arc::new(self.query.clone());

        FundingWatcher::spawn(source, request, self.shutdown.child_token())
            .finish(on_update)
            .await
    }

    /// Explorer URL for an address or transaction id
    pub fn explorer_link(&self, value: &str) -> String {
        self.explorer.link(value)
    }

    /// Ask the configured faucet for test coins
    pub async fn request_faucet_funds(
        &self,
        address: &str,
        amount: Option<u64>,
    ) -> Result<FaucetReceipt, SyncError> {
        ScriptHash::from_address(address, self.config.network)?;
        let faucet = self
            .faucet
            .as_ref()
            .ok_or_else(|| SyncError::Config("no faucet configured".to_string()))?;
        faucet.request_funds(address, amount).await
    }

    pub fn connection_events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connections.subscribe_events()
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.active_count().await
    }

    /// Stop every watcher and subscription started here and close the link
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.connections.disconnect().await;
        info!("chain sync shut down");
    }
}

// ============================================================================
// Tests
// ============================================================================
