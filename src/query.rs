//! UTXO Query
//!
//! One-shot unspent-output lookups for an address.

use async_trait::async_trait;
use tracing::debug;

use crate::common::{Network, SyncError};
use crate::connection::ConnectionManager;
use crate::digest::AddressDigest;
use crate::types::{Utxo, UtxoTotals};

/// Anything that can report the unspent outputs of an address
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UtxoSource: Send + Sync {
    async fn fetch(&self, address: &str) -> Result<Vec<Utxo>, SyncError>;
}

/// Looks up unspent outputs through the shared connection
#[derive(Clone)]
pub struct UtxoQuery {
    connections: ConnectionManager,
    network: Network,
}

impl UtxoQuery {
    pub fn new(connections: ConnectionManager, network: Network) -> Self {
        Self {
            connections,
            network,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Current unspent outputs of `address`
    ///
    /// A malformed address fails before any connection is attempted.
    pub async fn fetch(&self, address: &str) -> Result<Vec<Utxo>, SyncError> {
        let digest = AddressDigest::parse(address, self.network)?;
        self.fetch_digest(&digest).await
    }

    pub async fn fetch_digest(&self, digest: &AddressDigest) -> Result<Vec<Utxo>, SyncError> {
        let connection = self.connections.get_connection().await?;
        let entries = connection.list_unspent(digest.script()).await?;
        debug!(digest = %digest.hash(), count = entries.len(), "fetched unspent outputs");

        Ok(entries.into_iter().map(Utxo::from).collect())
    }

    /// Confirmed and unconfirmed totals for `address`
    pub async fn balance(&self, address: &str) -> Result<UtxoTotals, SyncError> {
        let utxos = self.fetch(address).await?;
        Ok(UtxoTotals::from_utxos(&utxos))
    }
}

#[async_trait]
impl UtxoSource for UtxoQuery {
    async fn fetch(&self, address: &str) -> Result<Vec<Utxo>, SyncError> {
        UtxoQuery::fetch(self, address).await
    }
}
