//! Address Digests
//!
//! Electrum servers index outputs by script hash: SHA-256 of the output's
//! `script_pubkey`, byte-reversed, sent as hex. Derivation is pure and fails
//! on a malformed address before anything touches the network.

use std::str::FromStr;

use bitcoin::{Address, Script, ScriptBuf};
use sha2::{Digest, Sha256};

use crate::common::{Network, SyncError};

/// An address resolved to its locking script and index key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressDigest {
    script: ScriptBuf,
    hash: ScriptHash,
}

impl AddressDigest {
    /// Resolve `address`, which must belong to `network`
    pub fn parse(address: &str, network: Network) -> Result<Self, SyncError> {
        let unchecked =
            Address::from_str(address).map_err(|e| SyncError::invalid_address(address, e))?;
        let checked = unchecked
            .require_network(network.bitcoin_network())
            .map_err(|e| SyncError::invalid_address(address, e))?;

        Ok(Self::from_script(checked.script_pubkey()))
    }

    pub fn from_script(script: ScriptBuf) -> Self {
        let hash = ScriptHash::from_script(&script);
        Self { script, hash }
    }

    /// Locking script the index server is queried with
    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn hash(&self) -> ScriptHash {
        self.hash
    }
}

/// Index key for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptHash([u8; 32]);

impl ScriptHash {
    /// Derive the digest for an address on `network`
    pub fn from_address(address: &str, network: Network) -> Result<Self, SyncError> {
        AddressDigest::parse(address, network).map(|digest| digest.hash())
    }

    /// Digest of a raw locking script
    pub fn from_script(script: &Script) -> Self {
        let hash = Sha256::digest(script.as_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hash);
        bytes.reverse();
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for ScriptHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ScriptHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("invalid script hash hex: {}", e))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| format!("script hash must be 32 bytes, got {}", v.len()))?;
        Ok(Self(bytes))
    }
}
