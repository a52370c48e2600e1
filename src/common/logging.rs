//! Structured Logging for chainsync
//!
//! Engine code logs through `tracing` macros with structured fields. Lifecycle
//! events (connects, drops, subscriptions, funding outcomes) are additionally
//! emitted as one JSON document per line so they can be shipped as-is.
//!
//! # Usage
//!
//! ```rust,no_run
//! use chainsync::common::logging::{init_logging, LogLevel};
//!
//! init_logging(LogLevel::Info, false).expect("logging");
//! ```

use serde::Serialize;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

// ============================================================================
// Log Levels
// ============================================================================

/// Application log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl LogLevel {
    fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// ============================================================================
// Structured Event Types
// ============================================================================

/// Event categories for structured logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Connect, disconnect, reconnect
    Connection,
    /// Push subscriptions
    Subscription,
    /// Funding watcher lifecycle
    Funding,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (RFC 3339)
    pub timestamp: String,
    /// Log level
    pub level: String,
    /// Event category
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Watcher or subscription id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub code: String,
    pub message: String,
}

impl LogEvent {
    /// Create a new log event
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: level.as_filter().to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    /// Add correlation ID
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// Add structured data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add duration
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Add error details
    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            code: code.into(),
            message: message.into(),
        });
        self
    }

    /// Serialize this event to JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}",
                self.message
            )
        })
    }
}

// ============================================================================
// Event Logging
// ============================================================================

/// Log a connection lifecycle event
pub fn log_connection_event(event_type: &str, server: &str, attempt: u64, error: Option<&str>) {
    let level = if error.is_some() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    let mut event = LogEvent::new(level, EventCategory::Connection, event_type).with_data(
        serde_json::json!({
            "server": server,
            "attempt": attempt,
        }),
    );

    if let Some(err) = error {
        event = event.with_error("CONNECTION_FAILURE", err);
    }

    match level {
        LogLevel::Warn => tracing::warn!(target: "chainsync::connection", "{}", event.to_json()),
        _ => tracing::info!(target: "chainsync::connection", "{}", event.to_json()),
    }
}

/// Log a subscription lifecycle event
pub fn log_subscription_event(event_type: &str, subscription_id: &str, address: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Subscription, event_type)
        .with_correlation_id(subscription_id)
        .with_data(serde_json::json!({ "address": address }));

    tracing::info!(target: "chainsync::subscription", "{}", event.to_json());
}

/// Log a funding watcher event
pub fn log_funding_event(
    event_type: &str,
    watcher_id: &str,
    address: &str,
    required_sats: u64,
    total_sats: u64,
    elapsed_ms: u64,
    error: Option<&str>,
) {
    let level = if error.is_some() {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    let mut event = LogEvent::new(level, EventCategory::Funding, event_type)
        .with_correlation_id(watcher_id)
        .with_duration(elapsed_ms)
        .with_data(serde_json::json!({
            "address": address,
            "required_sats": required_sats,
            "total_sats": total_sats,
        }));

    if let Some(err) = error {
        event = event.with_error("FUNDING_ERROR", err);
    }

    match level {
        LogLevel::Warn => tracing::warn!(target: "chainsync::funding", "{}", event.to_json()),
        _ => tracing::info!(target: "chainsync::funding", "{}", event.to_json()),
    }
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("chainsync={},warn", level.as_filter()))
    });

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from SyncConfig
pub fn init_from_config(config: &super::config::SyncConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.log_json)
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for watchers and subscriptions
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Funding, "funding_confirmed")
            .with_correlation_id("watch-123")
            .with_data(serde_json::json!({"total_sats": 2500}))
            .with_duration(4500);

        let json = event.to_json();
        assert!(json.contains("funding_confirmed"));
        assert!(json.contains("watch-123"));
        assert!(json.contains("\"category\":\"funding\""));
        assert!(json.contains("4500"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_log_event_with_error() {
        let event = LogEvent::new(LogLevel::Warn, EventCategory::Connection, "connect_failed")
            .with_error("CONNECTION_FAILURE", "refused");

        let json = event.to_json();
        assert!(json.contains("\"level\":\"WARN\""));
        assert!(json.contains("CONNECTION_FAILURE"));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_id_generation() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert_eq!(id1.len(), 32);
        assert_ne!(id1, id2);
    }
}
