//! Environment-based Configuration for chainsync
//!
//! Every setting has a network-aware default, so an empty environment yields
//! a working testnet configuration.
//!
//! # Environment Variables
//!
//! ## Network
//! - `CHAINSYNC_NETWORK` - "bitcoin", "testnet", "signet" or "regtest" (default: "testnet")
//! - `CHAINSYNC_ELECTRUM_URL` - Electrum server as `tcp://host:port`, `ssl://host:port`
//!   or a bare `host:port` (plaintext)
//! - `CHAINSYNC_EXPLORER_URL` - Block explorer base URL used for links
//! - `CHAINSYNC_FAUCET_URL` - Optional faucet endpoint (test networks)
//!
//! ## Funding watcher
//! - `CHAINSYNC_POLL_INTERVAL_MS` - Poll cadence (default: 1500)
//! - `CHAINSYNC_FUNDING_TIMEOUT_MS` - Overall deadline (default: 300000)
//! - `CHAINSYNC_ACCEPT_UNCONFIRMED` - Count 0-conf value towards funding
//!   (default: on for test networks, rejected on mainnet)
//!
//! ## Connection
//! - `CHAINSYNC_CONNECT_TIMEOUT_MS` - TCP connect timeout (default: 10000)
//! - `CHAINSYNC_REQUEST_TIMEOUT_MS` - Per-request timeout (default: 10000)
//! - `CHAINSYNC_PUSH_POLL_MS` - How often the session pings the server and
//!   collects queued subscription pushes (default: 1000)
//! - `CHAINSYNC_RESUBSCRIBE_DELAY_MS` - Backoff before a dropped subscription
//!   reconnects (default: 2000)
//!
//! ## Logging
//! - `CHAINSYNC_LOG_LEVEL` - trace, debug, info, warn, error (default: info)
//! - `CHAINSYNC_LOG_JSON` - Set to "1" for JSON log lines

use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::electrum::ElectrumUrl;
use crate::funding::ConfirmationPolicy;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("unconfirmed funding is not allowed on {0}")]
    UnconfirmedNotAllowed(String),
}

/// Bitcoin network the engine talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Bitcoin,
    Testnet,
    Signet,
    Regtest,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bitcoin" | "mainnet" | "main" => Ok(Network::Bitcoin),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            "regtest" => Ok(Network::Regtest),
            _ => Err(ConfigError::InvalidValue(
                "CHAINSYNC_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Bitcoin => write!(f, "bitcoin"),
            Network::Testnet => write!(f, "testnet"),
            Network::Signet => write!(f, "signet"),
            Network::Regtest => write!(f, "regtest"),
        }
    }
}

impl Network {
    /// Whether 0-conf funding may be accepted on this network
    pub fn allows_unconfirmed(&self) -> bool {
        !matches!(self, Network::Bitcoin)
    }

    /// Default Electrum endpoint; TLS for public networks, a local node otherwise
    pub fn default_electrum_url(&self) -> ElectrumUrl {
        match self {
            Network::Bitcoin => ElectrumUrl::Tls("electrum.blockstream.info:50002".to_string(), true),
            Network::Testnet => ElectrumUrl::Tls("electrum.blockstream.info:60002".to_string(), true),
            Network::Signet => ElectrumUrl::plaintext("127.0.0.1:60601"),
            Network::Regtest => ElectrumUrl::plaintext("127.0.0.1:60401"),
        }
    }

    /// Default explorer base URL
    pub fn default_explorer_url(&self) -> &'static str {
        match self {
            Network::Bitcoin => "https://mempool.space",
            Network::Testnet => "https://mempool.space/testnet",
            Network::Signet => "https://mempool.space/signet",
            Network::Regtest => "http://127.0.0.1:8080",
        }
    }

    /// Address prefixes the explorer classifier treats as address-shaped
    pub fn address_prefixes(&self) -> &'static [&'static str] {
        match self {
            Network::Bitcoin => &["bc1", "1", "3"],
            Network::Testnet | Network::Signet => &["tb1", "m", "n", "2"],
            Network::Regtest => &["bcrt1", "m", "n", "2"],
        }
    }

    /// Get bitcoin network enum
    pub fn bitcoin_network(&self) -> bitcoin::Network {
        match self {
            Network::Bitcoin => bitcoin::Network::Bitcoin,
            Network::Testnet => bitcoin::Network::Testnet,
            Network::Signet => bitcoin::Network::Signet,
            Network::Regtest => bitcoin::Network::Regtest,
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Network environment
    pub network: Network,

    /// Electrum server endpoint
    pub electrum_url: ElectrumUrl,

    /// Explorer base URL (no trailing slash)
    pub explorer_url: String,

    /// Faucet endpoint, if any
    pub faucet_url: Option<String>,

    /// Funding watcher poll cadence
    pub poll_interval: Duration,

    /// Funding watcher deadline
    pub funding_timeout: Duration,

    /// Which UTXOs count towards a funding target
    pub confirmation_policy: ConfirmationPolicy,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Per-request timeout
    pub request_timeout: Duration,

    /// Cadence of the ping that also collects subscription pushes
    pub push_poll_interval: Duration,

    /// Delay before a subscription retries after losing its connection
    pub resubscribe_delay: Duration,

    /// Log level
    pub log_level: String,

    /// Emit JSON log lines
    pub log_json: bool,
}

impl SyncConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network: Network = lookup("CHAINSYNC_NETWORK")
            .unwrap_or_else(|| "testnet".to_string())
            .parse()?;

        let electrum_url = match lookup("CHAINSYNC_ELECTRUM_URL") {
            Some(raw) => raw.parse::<ElectrumUrl>().map_err(|e| {
                ConfigError::InvalidValue("CHAINSYNC_ELECTRUM_URL".to_string(), e.to_string())
            })?,
            None => network.default_electrum_url(),
        };

        let explorer_url = lookup("CHAINSYNC_EXPLORER_URL")
            .unwrap_or_else(|| network.default_explorer_url().to_string())
            .trim_end_matches('/')
            .to_string();

        let faucet_url = lookup("CHAINSYNC_FAUCET_URL").filter(|url| !url.trim().is_empty());

        let poll_interval = millis(&lookup, "CHAINSYNC_POLL_INTERVAL_MS", 1_500)?;
        let funding_timeout = millis(&lookup, "CHAINSYNC_FUNDING_TIMEOUT_MS", 300_000)?;

        // 0-conf acceptance: on by default only where it cannot cost real funds
        let accept_unconfirmed = match lookup("CHAINSYNC_ACCEPT_UNCONFIRMED") {
            Some(v) => parse_flag("CHAINSYNC_ACCEPT_UNCONFIRMED", &v)?,
            None => network.allows_unconfirmed(),
        };
        if accept_unconfirmed && !network.allows_unconfirmed() {
            return Err(ConfigError::UnconfirmedNotAllowed(network.to_string()));
        }
        let confirmation_policy = if accept_unconfirmed {
            ConfirmationPolicy::AcceptUnconfirmed
        } else {
            ConfirmationPolicy::ConfirmedOnly
        };

        let connect_timeout = millis(&lookup, "CHAINSYNC_CONNECT_TIMEOUT_MS", 10_000)?;
        let request_timeout = millis(&lookup, "CHAINSYNC_REQUEST_TIMEOUT_MS", 10_000)?;
        let push_poll_interval = millis(&lookup, "CHAINSYNC_PUSH_POLL_MS", 1_000)?;
        let resubscribe_delay = millis(&lookup, "CHAINSYNC_RESUBSCRIBE_DELAY_MS", 2_000)?;

        let log_level = lookup("CHAINSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string());
        let log_json = match lookup("CHAINSYNC_LOG_JSON") {
            Some(v) => parse_flag("CHAINSYNC_LOG_JSON", &v)?,
            None => false,
        };

        let config = Self {
            network,
            electrum_url,
            explorer_url,
            faucet_url,
            poll_interval,
            funding_timeout,
            confirmation_policy,
            connect_timeout,
            request_timeout,
            push_poll_interval,
            resubscribe_delay,
            log_level,
            log_json,
        };
        config.validate()?;
        Ok(config)
    }

    /// Defaults for a network, ignoring the environment
    pub fn for_network(network: Network) -> Self {
        let policy = if network.allows_unconfirmed() {
            ConfirmationPolicy::AcceptUnconfirmed
        } else {
            ConfirmationPolicy::ConfirmedOnly
        };

        Self {
            network,
            electrum_url: network.default_electrum_url(),
            explorer_url: network.default_explorer_url().to_string(),
            faucet_url: None,
            poll_interval: Duration::from_millis(1_500),
            funding_timeout: Duration::from_millis(300_000),
            confirmation_policy: policy,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            push_poll_interval: Duration::from_secs(1),
            resubscribe_delay: Duration::from_secs(2),
            log_level: "info".to_string(),
            log_json: false,
        }
    }

    /// Validate timing settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CHAINSYNC_POLL_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        if self.funding_timeout < self.poll_interval {
            return Err(ConfigError::InvalidValue(
                "CHAINSYNC_FUNDING_TIMEOUT_MS".to_string(),
                "must not be shorter than the poll interval".to_string(),
            ));
        }

        if self.request_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CHAINSYNC_REQUEST_TIMEOUT_MS".to_string(),
                "timeouts must be greater than zero".to_string(),
            ));
        }

        if self.push_poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "CHAINSYNC_PUSH_POLL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== chainsync configuration ===");
        println!("Network: {}", self.network);
        println!("Electrum: {}", self.electrum_url);
        println!("Explorer: {}", self.explorer_url);
        println!(
            "Faucet: {}",
            self.faucet_url.as_deref().unwrap_or("(not configured)")
        );
        println!("Poll interval: {} ms", self.poll_interval.as_millis());
        println!("Funding timeout: {} ms", self.funding_timeout.as_millis());
        println!("Confirmation policy: {}", self.confirmation_policy);
        println!("Request timeout: {} ms", self.request_timeout.as_millis());
        println!("Push poll interval: {} ms", self.push_poll_interval.as_millis());
        println!("Log level: {}", self.log_level);
        println!("===============================");
    }
}

fn number<F>(lookup: &F, key: &str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), format!("not a number: {}", raw))
        }),
        None => Ok(default),
    }
}

fn millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    number(lookup, key, default).map(Duration::from_millis)
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("expected a boolean, got {}", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_network_parsing() {
        assert!(matches!("bitcoin".parse::<Network>(), Ok(Network::Bitcoin)));
        assert!(matches!("mainnet".parse::<Network>(), Ok(Network::Bitcoin)));
        assert!(matches!("testnet".parse::<Network>(), Ok(Network::Testnet)));
        assert!(matches!("Signet".parse::<Network>(), Ok(Network::Signet)));
        assert!(matches!("regtest".parse::<Network>(), Ok(Network::Regtest)));
        assert!("invalid".parse::<Network>().is_err());
    }

    #[test]
    fn test_defaults_from_empty_environment() {
        let config = SyncConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.electrum_url.to_string(), "ssl://electrum.blockstream.info:60002");
        assert!(config.electrum_url.validate_domain());
        assert_eq!(config.explorer_url, "https://mempool.space/testnet");
        assert_eq!(config.poll_interval, Duration::from_millis(1_500));
        assert_eq!(config.funding_timeout, Duration::from_millis(300_000));
        assert_eq!(config.confirmation_policy, ConfirmationPolicy::AcceptUnconfirmed);
        assert_eq!(config.push_poll_interval, Duration::from_secs(1));
        assert!(config.faucet_url.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("CHAINSYNC_NETWORK", "regtest"),
            ("CHAINSYNC_ELECTRUM_URL", "tcp://localhost:50001"),
            ("CHAINSYNC_EXPLORER_URL", "http://explorer.local/"),
            ("CHAINSYNC_POLL_INTERVAL_MS", "250"),
            ("CHAINSYNC_FUNDING_TIMEOUT_MS", "5000"),
            ("CHAINSYNC_ACCEPT_UNCONFIRMED", "false"),
            ("CHAINSYNC_PUSH_POLL_MS", "200"),
            ("CHAINSYNC_FAUCET_URL", "http://faucet.local/api"),
        ]))
        .unwrap();

        assert_eq!(config.network, Network::Regtest);
        assert_eq!(config.electrum_url.host_port(), "localhost:50001");
        assert!(!config.electrum_url.is_tls());
        assert_eq!(config.explorer_url, "http://explorer.local");
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.confirmation_policy, ConfirmationPolicy::ConfirmedOnly);
        assert_eq!(config.push_poll_interval, Duration::from_millis(200));
        assert_eq!(config.faucet_url.as_deref(), Some("http://faucet.local/api"));
    }

    #[test]
    fn test_unconfirmed_restrictions() {
        assert!(Network::Testnet.allows_unconfirmed());
        assert!(Network::Regtest.allows_unconfirmed());
        assert!(!Network::Bitcoin.allows_unconfirmed());

        let mainnet = SyncConfig::from_lookup(lookup_from(&[("CHAINSYNC_NETWORK", "bitcoin")]))
            .unwrap();
        assert_eq!(mainnet.confirmation_policy, ConfirmationPolicy::ConfirmedOnly);

        let rejected = SyncConfig::from_lookup(lookup_from(&[
            ("CHAINSYNC_NETWORK", "bitcoin"),
            ("CHAINSYNC_ACCEPT_UNCONFIRMED", "1"),
        ]));
        assert!(matches!(rejected, Err(ConfigError::UnconfirmedNotAllowed(_))));
    }

    #[test]
    fn test_invalid_timing_rejected() {
        let zero_poll =
            SyncConfig::from_lookup(lookup_from(&[("CHAINSYNC_POLL_INTERVAL_MS", "0")]));
        assert!(zero_poll.is_err());

        let short_timeout = SyncConfig::from_lookup(lookup_from(&[
            ("CHAINSYNC_POLL_INTERVAL_MS", "2000"),
            ("CHAINSYNC_FUNDING_TIMEOUT_MS", "1000"),
        ]));
        assert!(short_timeout.is_err());

        let garbage =
            SyncConfig::from_lookup(lookup_from(&[("CHAINSYNC_REQUEST_TIMEOUT_MS", "soon")]));
        assert!(garbage.is_err());

        let zero_push = SyncConfig::from_lookup(lookup_from(&[("CHAINSYNC_PUSH_POLL_MS", "0")]));
        assert!(zero_push.is_err());
    }

    #[test]
    fn test_electrum_url_schemes() {
        let tls = SyncConfig::from_lookup(lookup_from(&[(
            "CHAINSYNC_ELECTRUM_URL",
            "ssl://electrum.example.org:50002",
        )]))
        .unwrap();
        assert!(tls.electrum_url.is_tls());
        assert_eq!(tls.electrum_url.host_port(), "electrum.example.org:50002");

        let regtest = SyncConfig::for_network(Network::Regtest);
        assert_eq!(regtest.electrum_url, ElectrumUrl::plaintext("127.0.0.1:60401"));

        let bad_scheme = SyncConfig::from_lookup(lookup_from(&[(
            "CHAINSYNC_ELECTRUM_URL",
            "http://electrum.example.org:50001",
        )]));
        assert!(matches!(bad_scheme, Err(ConfigError::InvalidValue(..))));
    }
}
