//! Funding request parameters

use std::time::Duration;

use crate::common::SyncConfig;
use crate::types::ConfirmationPolicy;

/// What a funding watcher waits for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRequest {
    pub address: String,
    /// Target in satoshis
    pub required_amount: u64,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub policy: ConfirmationPolicy,
}

impl FundingRequest {
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1_500);
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(300_000);

    pub fn new(address: impl Into<String>, required_amount: u64) -> Self {
        Self {
            address: address.into(),
            required_amount,
            timeout: Self::DEFAULT_TIMEOUT,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            policy: ConfirmationPolicy::default(),
        }
    }

    /// Request using the configured cadence, deadline and policy
    pub fn from_config(address: impl Into<String>, required_amount: u64, config: &SyncConfig) -> Self {
        Self {
            address: address.into(),
            required_amount,
            timeout: config.funding_timeout,
            poll_interval: config.poll_interval,
            policy: config.confirmation_policy,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_policy(mut self, policy: ConfirmationPolicy) -> Self {
        self.policy = policy;
        self
    }
}
