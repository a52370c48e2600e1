//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the engine:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{ConfigError, Network, SyncConfig};
pub use error::SyncError;
pub use logging::{
    generate_correlation_id, init_from_config, init_logging, log_connection_event,
    log_funding_event, log_subscription_event, EventCategory, LogEvent, LogLevel, LoggingError,
};
