//! Funding Watch Module
//!
//! Waits for an address to accumulate a target amount.
//!
//! Watchers are fully independent: each owns its own deadline, poll timer
//! and cancellation token. They share nothing but the connection behind the
//! `UtxoSource`.

pub mod handle;
pub mod request;
pub mod watcher;

pub use crate::types::ConfirmationPolicy;
pub use handle::FundingHandle;
pub use request::FundingRequest;
pub use watcher::FundingWatcher;
