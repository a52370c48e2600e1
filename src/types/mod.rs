//! Shared Types Module
//!
//! Data types shared across the engine.

pub mod funding;
pub mod units;
pub mod utxo;

// Re-exports for convenience
pub use funding::{ConfirmationPolicy, FundingState, FundingStatus};
pub use units::{parse_amount, sats_to_btc_string, sats_to_display, SATS_PER_BTC};
pub use utxo::{Utxo, UtxoTotals};
