//! Block explorer links

use crate::common::{Network, SyncConfig};

/// Builds explorer URLs for addresses and transactions
#[derive(Debug, Clone)]
pub struct ExplorerLinks {
    base_url: String,
    address_prefixes: &'static [&'static str],
}

impl ExplorerLinks {
    pub fn new(base_url: &str, network: Network) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            address_prefixes: network.address_prefixes(),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.explorer_url, config.network)
    }

    /// `<base>/address/<value>` for address-shaped input, `<base>/tx/<value>` otherwise
    pub fn link(&self, value: &str) -> String {
        let kind = if self.is_address(value) { "address" } else { "tx" };
        format!("{}/{}/{}", self.base_url, kind, value)
    }

    /// Prefix check only; the value is not validated
    pub fn is_address(&self, value: &str) -> bool {
        // 64 hex chars is a txid even when it starts with a legacy prefix digit
        if value.len() == 64 && value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return false;
        }

        self.address_prefixes.iter().any(|prefix| {
            if prefix.ends_with('1') && prefix.len() > 1 {
                // bech32 may be upper case
                value
                    .get(..prefix.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
            } else {
                value.starts_with(prefix)
            }
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TXID: &str = "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b";

    #[test]
    fn test_testnet_links() {
        let links = ExplorerLinks::new("https://mempool.space/testnet/", Network::Testnet);

        assert_eq!(
            links.link("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"),
            "https://mempool.space/testnet/address/tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"
        );
        assert_eq!(links.link(TXID), format!("https://mempool.space/testnet/tx/{}", TXID));
        assert!(links.is_address("mipcBbFg9gMiCh81Kj8tqqdgoZub1ZJRfn"));
        assert!(links.is_address("2MzQwSSnBHWHqSAqtTVQ6v47XtaisrJa1Vc"));
        assert!(links.is_address("TB1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KXPJZSX"));
    }

    #[test]
    fn test_mainnet_prefixes() {
        let links = ExplorerLinks::new("https://mempool.space", Network::Bitcoin);

        assert!(links.is_address("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"));
        assert!(links.is_address("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa"));
        assert!(links.is_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy"));
        assert!(!links.is_address("tb1qw508d6qejxtdg4y5r3zarvary0c5xw7kxpjzsx"));

        // txid starting with a legacy prefix digit
        let txid = format!("1{}", &TXID[1..]);
        assert!(!links.is_address(&txid));
    }

    #[test]
    fn test_regtest_prefix() {
        let links = ExplorerLinks::new("http://127.0.0.1:8080", Network::Regtest);
        assert!(links.is_address("bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080"));
        assert_eq!(links.link("abc"), "http://127.0.0.1:8080/tx/abc");
    }
}
