//! Common Error Types for chainsync
//!
//! Provides unified error handling across the engine. `SyncError` is `Clone`
//! so a single failed connect attempt can be handed to every caller that was
//! waiting on it.

use thiserror::Error;

/// Root error type for the synchronization engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Address could not be decoded into a locking script
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Connecting to the index server failed or the link dropped
    #[error("connection error: {0}")]
    Connection(String),

    /// A single request failed (timeout, closed mid-flight)
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The server sent something we could not understand
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server answered with a JSON-RPC error object
    #[error("server error {code}: {message}")]
    Server { code: i64, message: String },

    /// Faucet request failed
    #[error("faucet error: {0}")]
    Faucet(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a faucet error
    pub fn faucet(msg: impl Into<String>) -> Self {
        Self::Faucet(msg.into())
    }

    /// Check if this is a retryable error
    ///
    /// Polling loops keep going on retryable errors and give up on the rest.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Connection(_)
                | SyncError::Fetch(_)
                | SyncError::Protocol(_)
                | SyncError::Server { .. }
        )
    }

    /// Get a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::InvalidAddress { .. } => "INVALID_ADDRESS",
            SyncError::Connection(_) => "CONNECTION_FAILURE",
            SyncError::Fetch(_) => "TRANSIENT_FETCH_ERROR",
            SyncError::Protocol(_) => "PROTOCOL_ERROR",
            SyncError::Server { .. } => "SERVER_ERROR",
            SyncError::Faucet(_) => "FAUCET_ERROR",
            SyncError::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<super::config::ConfigError> for SyncError {
    fn from(err: super::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<super::logging::LoggingError> for SyncError {
    fn from(err: super::logging::LoggingError) -> Self {
        Self::Config(err.to_string())
    }
}
