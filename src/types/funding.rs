//! Funding Status Types
//!
//! Status values emitted by a funding watcher:
//! idle → monitoring → confirmed | timeout | error

use serde::{Deserialize, Serialize};

use super::utxo::{Utxo, UtxoTotals};

/// Position of a funding watcher in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingState {
    /// Not started
    Idle,
    /// Polling, threshold not reached yet
    Monitoring,
    /// Threshold reached
    Confirmed,
    /// Deadline passed without reaching the threshold
    Timeout,
    /// Gave up on a non-retryable failure
    Error,
}

impl Default for FundingState {
    fn default() -> Self {
        Self::Idle
    }
}

impl FundingState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Timeout | Self::Error)
    }
}

impl std::fmt::Display for FundingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Monitoring => write!(f, "monitoring"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Timeout => write!(f, "timeout"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Which outputs count towards a funding target
///
/// `AcceptUnconfirmed` treats mempool value as spendable. That trades safety
/// for responsiveness and is only suitable for test networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationPolicy {
    /// Confirmed plus mempool value
    AcceptUnconfirmed,
    /// Only value at `height > 0`
    ConfirmedOnly,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::AcceptUnconfirmed
    }
}

impl ConfirmationPolicy {
    /// Value that counts under this policy
    pub fn counted_value(&self, totals: &UtxoTotals) -> u64 {
        match self {
            Self::AcceptUnconfirmed => totals.total(),
            Self::ConfirmedOnly => totals.confirmed,
        }
    }

    pub fn is_satisfied(&self, totals: &UtxoTotals, required: u64) -> bool {
        self.counted_value(totals) >= required
    }
}

impl std::fmt::Display for ConfirmationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AcceptUnconfirmed => write!(f, "accept_unconfirmed"),
            Self::ConfirmedOnly => write!(f, "confirmed_only"),
        }
    }
}

/// Snapshot of a funding watcher
///
/// Every emission is a new value; a terminal status is never changed after
/// it has been handed out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingStatus {
    pub status: FundingState,
    pub utxos: Vec<Utxo>,
    pub total_value: u64,
    pub confirmed_value: u64,
    pub unconfirmed_value: u64,
    /// First funding transaction once confirmed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FundingStatus {
    fn with_state(status: FundingState, utxos: Vec<Utxo>) -> Self {
        let totals = UtxoTotals::from_utxos(&utxos);
        Self {
            status,
            total_value: totals.total(),
            confirmed_value: totals.confirmed,
            unconfirmed_value: totals.unconfirmed,
            utxos,
            txid: None,
            error: None,
        }
    }

    pub fn monitoring(utxos: Vec<Utxo>) -> Self {
        Self::with_state(FundingState::Monitoring, utxos)
    }

    pub fn confirmed(utxos: Vec<Utxo>) -> Self {
        let mut status = Self::with_state(FundingState::Confirmed, utxos);
        status.txid = status.utxos.first().map(|u| u.txid.clone());
        status
    }

    pub fn timeout(utxos: Vec<Utxo>, message: impl Into<String>) -> Self {
        Self::with_state(FundingState::Timeout, utxos).with_error(message)
    }

    pub fn error(utxos: Vec<Utxo>, message: impl Into<String>) -> Self {
        Self::with_state(FundingState::Error, utxos).with_error(message)
    }

    /// Attach an error message (used for transient failures while monitoring)
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == FundingState::Confirmed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_totals() {
        let status = FundingStatus::monitoring(vec![
            Utxo::new("a", 0, 1_200, 0),
            Utxo::new("b", 1, 800, 500),
        ]);

        assert_eq!(status.status, FundingState::Monitoring);
        assert_eq!(status.total_value, 2_000);
        assert_eq!(status.confirmed_value, 800);
        assert_eq!(status.unconfirmed_value, 1_200);
        assert!(status.txid.is_none());
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_confirmed_carries_first_txid() {
        let status = FundingStatus::confirmed(vec![
            Utxo::new("first", 0, 1_000, 0),
            Utxo::new("second", 0, 1_000, 0),
        ]);

        assert!(status.is_confirmed());
        assert!(status.is_terminal());
        assert_eq!(status.txid.as_deref(), Some("first"));
    }

    #[test]
    fn test_policy_threshold() {
        let totals = UtxoTotals {
            confirmed: 500,
            unconfirmed: 1_500,
        };

        assert!(ConfirmationPolicy::AcceptUnconfirmed.is_satisfied(&totals, 2_000));
        assert!(!ConfirmationPolicy::ConfirmedOnly.is_satisfied(&totals, 2_000));
        assert!(ConfirmationPolicy::ConfirmedOnly.is_satisfied(&totals, 500));
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&FundingState::Timeout).unwrap();
        assert_eq!(json, "\"timeout\"");

        let status = FundingStatus::error(vec![], "invalid address");
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("invalid address"));
        assert!(!json.contains("txid"));
    }
}
