//! UTXO Types
//!
//! Normalized unspent outputs as handed to callers. A fresh set is built on
//! every query; nothing here is diffed or mutated in place.

use serde::{Deserialize, Serialize};

/// Unspent transaction output
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Utxo {
    /// Transaction ID (hex, display order)
    pub txid: String,
    /// Output index
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
    /// Block height, 0 while unconfirmed
    pub height: u32,
}

impl Utxo {
    pub fn new(txid: impl Into<String>, vout: u32, value: u64, height: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
            value,
            height,
        }
    }

    /// Whether the output is in a block
    pub fn is_confirmed(&self) -> bool {
        self.height > 0
    }

    /// 1 once mined, 0 while in the mempool
    ///
    /// This is a flag derived from `height`, not a depth count.
    pub fn confirmations(&self) -> u32 {
        u32::from(self.is_confirmed())
    }

    /// `txid:vout`
    pub fn outpoint(&self) -> String {
        format!("{}:{}", self.txid, self.vout)
    }
}

/// Value of a UTXO set split by confirmation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoTotals {
    /// Sum of outputs with `height > 0`
    pub confirmed: u64,
    /// Sum of outputs with `height == 0`
    pub unconfirmed: u64,
}

impl UtxoTotals {
    pub fn from_utxos(utxos: &[Utxo]) -> Self {
        utxos.iter().fold(Self::default(), |mut totals, utxo| {
            if utxo.is_confirmed() {
                totals.confirmed = totals.confirmed.saturating_add(utxo.value);
            } else {
                totals.unconfirmed = totals.unconfirmed.saturating_add(utxo.value);
            }
            totals
        })
    }

    pub fn total(&self) -> u64 {
        self.confirmed.saturating_add(self.unconfirmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_flag() {
        let mempool = Utxo::new("aa", 0, 1_000, 0);
        let mined = Utxo::new("bb", 1, 2_000, 840_000);

        assert!(!mempool.is_confirmed());
        assert_eq!(mempool.confirmations(), 0);
        assert!(mined.is_confirmed());
        assert_eq!(mined.confirmations(), 1);
        assert_eq!(mined.outpoint(), "bb:1");
    }

    #[test]
    fn test_totals_partition() {
        let utxos = vec![
            Utxo::new("a", 0, 1_500, 0),
            Utxo::new("b", 0, 700, 101),
            Utxo::new("c", 2, 300, 102),
        ];

        let totals = UtxoTotals::from_utxos(&utxos);
        assert_eq!(totals.unconfirmed, 1_500);
        assert_eq!(totals.confirmed, 1_000);
        assert_eq!(totals.total(), 2_500);
        assert_eq!(UtxoTotals::from_utxos(&[]).total(), 0);
    }
}
