//! chainsync - Bitcoin address sync over Electrum
//!
//! Keeps a view of the unspent outputs of Bitcoin addresses in sync with an
//! Electrum index server.
//!
//! ## Components
//!
//! 1. **Address digests** - script hash keys the server indexes outputs by
//! 2. **Connection manager** - one shared link, single-flight connect
//! 3. **UTXO queries** - one-shot unspent-output lookups
//! 4. **Subscriptions** - push-driven refresh of an address's unspent set
//! 5. **Funding watcher** - poll an address until it holds a target amount
//! 6. **ChainSync** - the facade composing all of the above
//!
//! ```no_run
//! # async fn demo() -> Result<(), chainsync::SyncError> {
//! use chainsync::{ChainSync, SyncConfig};
//! use std::time::Duration;
//!
//! let sync = ChainSync::new(SyncConfig::from_env()?);
//! let utxos = sync.fetch_utxos("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx").await?;
//! println!("{} unspent outputs", utxos.len());
//!
//! let outcome = sync
//!     .poll_for_funding(
//!         "tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx",
//!         2_000,
//!         |status| println!("{}", status.status),
//!         Duration::from_secs(300),
//!     )
//!     .await;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod common;
pub mod connection;
pub mod digest;
pub mod electrum;
pub mod explorer;
pub mod facade;
pub mod faucet;
pub mod funding;
pub mod query;
pub mod subscription;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports: engine
pub use connection::{ConnectionEvent, ConnectionManager, Connector, IndexConnection};
pub use digest::{AddressDigest, ScriptHash};
pub use facade::ChainSync;
pub use funding::{FundingHandle, FundingRequest, FundingWatcher};
pub use query::{UtxoQuery, UtxoSource};
pub use subscription::{Subscription, SubscriptionRegistry};

// Re-exports: transport
pub use electrum::{ElectrumConnection, ElectrumConnector, ElectrumOptions, ElectrumUrl, UrlError};

// Re-exports: configuration and errors
pub use common::{ConfigError, Network, SyncConfig, SyncError};

// Re-exports: data types
pub use types::{ConfirmationPolicy, FundingState, FundingStatus, Utxo, UtxoTotals};

// Re-exports: extras
pub use explorer::ExplorerLinks;
pub use faucet::{FaucetClient, FaucetReceipt};
