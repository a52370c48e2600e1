//! Electrum wire types and error mapping
//!
//! `electrum-client` does the framing; this module turns its results and
//! errors into engine types.

use electrum_client::ListUnspentRes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::SyncError;
use crate::types::Utxo;

pub const PROTOCOL_VERSION: &str = "1.4";

pub const SERVER_VERSION: &str = "server.version";
pub const SERVER_PING: &str = "server.ping";
pub const SCRIPTHASH_LISTUNSPENT: &str = "blockchain.scripthash.listunspent";
pub const SCRIPTHASH_SUBSCRIBE: &str = "blockchain.scripthash.subscribe";
pub const SCRIPTHASH_UNSUBSCRIBE: &str = "blockchain.scripthash.unsubscribe";

/// Turn a JSON-RPC error member into a `SyncError`
///
/// Servers disagree on the shape: most send `{code, message}`, some a bare
/// string.
pub fn server_error(error: Value) -> SyncError {
    match error {
        Value::Object(ref map) => SyncError::Server {
            code: map.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        },
        Value::String(message) => SyncError::Server { code: 0, message },
        other => SyncError::Server {
            code: 0,
            message: other.to_string(),
        },
    }
}

/// Classify a client failure for `method`
///
/// Transport failures come back as `Connection` and mean the session is
/// unusable. Server-side rejections keep their code.
pub fn client_error(method: &str, error: electrum_client::Error) -> SyncError {
    use electrum_client::Error as E;

    match error {
        E::Protocol(value) => server_error(value),
        E::AllAttemptsErrored(errors) => match errors.into_iter().last() {
            Some(E::Protocol(value)) => server_error(value),
            Some(inner) => SyncError::connection(format!("{} failed: {}", method, inner)),
            None => SyncError::connection(format!("{} failed", method)),
        },
        E::IOError(e) => SyncError::connection(format!("{}: {}", method, e)),
        E::SharedIOError(e) => SyncError::connection(format!("{}: {}", method, e)),
        E::JSON(e) => SyncError::protocol(format!("unexpected {} result: {}", method, e)),
        E::InvalidResponse(value) => {
            SyncError::protocol(format!("unexpected {} result: {}", method, value))
        }
        other => SyncError::fetch(format!("{}: {}", method, other)),
    }
}

/// Entry of a `blockchain.scripthash.listunspent` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnspentEntry {
    pub tx_hash: String,
    pub tx_pos: u32,
    pub value: u64,
    /// 0 for mempool, -1 for mempool with unconfirmed parents
    pub height: i64,
}

impl From<ListUnspentRes> for UnspentEntry {
    fn from(res: ListUnspentRes) -> Self {
        Self {
            tx_hash: res.tx_hash.to_string(),
            tx_pos: u32::try_from(res.tx_pos).unwrap_or(u32::MAX),
            value: res.value,
            height: i64::try_from(res.height).unwrap_or(i64::MAX),
        }
    }
}

impl From<UnspentEntry> for Utxo {
    fn from(entry: UnspentEntry) -> Self {
        Utxo::new(
            entry.tx_hash,
            entry.tx_pos,
            entry.value,
            u32::try_from(entry.height).unwrap_or(0),
        )
    }
}
