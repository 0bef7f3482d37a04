//! Structured Logging for the StakeVault Backend
//!
//! Provides structured logging with:
//! - JSON output for log aggregation services
//! - Correlation IDs for request tracing
//! - Settlement lifecycle events (stake, deposit, withdrawal)
//! - Security and operator-alert events
//!
//! # Usage
//!
//! ```rust,ignore
//! use stakevault::logging::{init_logging, LogLevel};
//!
//! // Initialize at startup
//! init_logging(LogLevel::Info, true)?; // JSON mode for production
//!
//! // Log events
//! tracing::info!(target: "stakevault::api", request_id = %id, "Processing unstake");
//! ```
//!
//! Logging is a side channel: none of these helpers return errors or affect
//! control flow.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::Level;
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

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
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
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// API request/response events
    Api,
    /// Stake intent lifecycle
    Stake,
    /// Observed deposits and reconciliation
    Deposit,
    /// Unstake saga
    Withdrawal,
    /// Security events (auth, validation failures)
    Security,
    /// Conditions that need a human
    Operator,
    /// System events (startup, shutdown)
    System,
}

/// Structured log event
#[derive(Debug, Serialize)]
pub struct LogEvent {
    /// Event timestamp (ISO 8601)
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    /// Human-readable message
    pub message: String,
    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// Additional structured data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Duration in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
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

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

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

fn emit(level: LogLevel, target_category: EventCategory, event: &LogEvent) {
    let json = event.to_json();
    // `target:` must be a literal, hence the match
    match (target_category, level) {
        (EventCategory::Security, LogLevel::Warn | LogLevel::Error) => {
            tracing::warn!(target: "stakevault::security", "{}", json)
        }
        (EventCategory::Security, _) => tracing::info!(target: "stakevault::security", "{}", json),
        (EventCategory::Operator, _) => tracing::error!(target: "stakevault::operator", "{}", json),
        (EventCategory::Api, LogLevel::Error) => tracing::error!(target: "stakevault::api", "{}", json),
        (EventCategory::Api, LogLevel::Warn) => tracing::warn!(target: "stakevault::api", "{}", json),
        (EventCategory::Api, _) => tracing::info!(target: "stakevault::api", "{}", json),
        (EventCategory::Stake, LogLevel::Error) => tracing::error!(target: "stakevault::stake", "{}", json),
        (EventCategory::Stake, _) => tracing::info!(target: "stakevault::stake", "{}", json),
        (EventCategory::Deposit, LogLevel::Error) => tracing::error!(target: "stakevault::deposit", "{}", json),
        (EventCategory::Deposit, LogLevel::Warn) => tracing::warn!(target: "stakevault::deposit", "{}", json),
        (EventCategory::Deposit, _) => tracing::info!(target: "stakevault::deposit", "{}", json),
        (EventCategory::Withdrawal, LogLevel::Error) => {
            tracing::error!(target: "stakevault::withdrawal", "{}", json)
        }
        (EventCategory::Withdrawal, _) => tracing::info!(target: "stakevault::withdrawal", "{}", json),
        (EventCategory::System, _) => tracing::info!(target: "stakevault::system", "{}", json),
    }
}

// ============================================================================
// Security Event Logging
// ============================================================================

/// Log a security-related event
pub fn log_security_event(
    event_type: &str,
    success: bool,
    details: serde_json::Value,
    correlation_id: Option<&str>,
) {
    let level = if success { LogLevel::Info } else { LogLevel::Warn };
    let mut event = LogEvent::new(level, EventCategory::Security, event_type).with_data(
        serde_json::json!({
            "success": success,
            "details": details
        }),
    );

    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }

    emit(level, EventCategory::Security, &event);
}

// ============================================================================
// API Logging
// ============================================================================

/// Log an API request
pub fn log_api_request(method: &str, path: &str, client_ip: Option<&str>, correlation_id: &str) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::Api, format!("{} {}", method, path))
        .with_correlation_id(correlation_id)
        .with_data(serde_json::json!({
            "method": method,
            "path": path,
            "client_ip": client_ip
        }));

    emit(LogLevel::Info, EventCategory::Api, &event);
}

/// Log an API response
pub fn log_api_response(method: &str, path: &str, status: u16, duration_ms: u64, correlation_id: &str) {
    let level = if status >= 500 {
        LogLevel::Error
    } else if status >= 400 {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };

    let event = LogEvent::new(level, EventCategory::Api, format!("{} {} -> {}", method, path, status))
        .with_correlation_id(correlation_id)
        .with_duration(duration_ms)
        .with_data(serde_json::json!({
            "method": method,
            "path": path,
            "status": status
        }));

    emit(level, EventCategory::Api, &event);
}

// ============================================================================
// Settlement Lifecycle Logging
// ============================================================================

/// Log a stake intent event (created, minted, refunded, ...)
pub fn log_stake_event(
    event_type: &str,
    intent_id: &str,
    user: &str,
    amount: Decimal,
    signature: Option<&str>,
    error: Option<&str>,
) {
    let level = if error.is_some() { LogLevel::Error } else { LogLevel::Info };
    let mut event = LogEvent::new(level, EventCategory::Stake, event_type)
        .with_correlation_id(intent_id)
        .with_data(serde_json::json!({
            "intent_id": intent_id,
            "user": user,
            "amount": amount.to_string(),
            "signature": signature
        }));

    if let Some(err) = error {
        event = event.with_error("STAKE_ERROR", err);
    }

    emit(level, EventCategory::Stake, &event);
}

/// Log the outcome of reconciling one observed transfer
pub fn log_deposit_event(
    outcome: &str,
    deposit_ref: Option<&str>,
    from: &str,
    amount: Decimal,
    intent_id: Option<&str>,
    error: Option<&str>,
) {
    let level = match (error, intent_id) {
        (Some(_), _) => LogLevel::Error,
        (None, None) => LogLevel::Warn,
        (None, Some(_)) => LogLevel::Info,
    };

    let mut event = LogEvent::new(level, EventCategory::Deposit, outcome).with_data(serde_json::json!({
        "deposit_ref": deposit_ref,
        "from": from,
        "amount": amount.to_string(),
        "intent_id": intent_id
    }));

    if let Some(id) = intent_id {
        event = event.with_correlation_id(id);
    }
    if let Some(err) = error {
        event = event.with_error("DEPOSIT_ERROR", err);
    }

    emit(level, EventCategory::Deposit, &event);
}

/// Log an unstake saga event
pub fn log_withdrawal_event(
    event_type: &str,
    unstake_id: &str,
    user: &str,
    amount: Decimal,
    signature: Option<&str>,
    error: Option<&str>,
) {
    let level = if error.is_some() { LogLevel::Error } else { LogLevel::Info };
    let mut event = LogEvent::new(level, EventCategory::Withdrawal, event_type)
        .with_correlation_id(unstake_id)
        .with_data(serde_json::json!({
            "unstake_id": unstake_id,
            "user": user,
            "amount": amount.to_string(),
            "signature": signature
        }));

    if let Some(err) = error {
        event = event.with_error("WITHDRAWAL_ERROR", err);
    }

    emit(level, EventCategory::Withdrawal, &event);
}

/// Raise an alert for a state that needs manual remediation
pub fn log_operator_alert(event_type: &str, intent_id: &str, details: serde_json::Value) {
    let event = LogEvent::new(LogLevel::Error, EventCategory::Operator, event_type)
        .with_correlation_id(intent_id)
        .with_data(details);

    emit(LogLevel::Error, EventCategory::Operator, &event);
}

/// Log a system lifecycle event
pub fn log_system_event(message: &str, details: serde_json::Value) {
    let event = LogEvent::new(LogLevel::Info, EventCategory::System, message).with_data(details);
    emit(LogLevel::Info, EventCategory::System, &event);
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize the logging system
///
/// `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let lvl = level.as_filter();
        EnvFilter::new(format!("stakevault={lvl},tower_http={lvl},axum={lvl}"))
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
                    .pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .try_init()
            .map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from VaultConfig
pub fn init_from_config(config: &crate::config::VaultConfig) -> Result<(), LoggingError> {
    init_logging(LogLevel::from(config.log_level.as_str()), config.network.json_logs())
}

/// Logging errors
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// Generate a unique correlation ID for request tracing
pub fn generate_correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(LogLevel::Info, EventCategory::Deposit, "matched")
            .with_correlation_id("intent-123")
            .with_data(serde_json::json!({"amount": "2"}))
            .with_duration(42);

        let json = event.to_json();
        assert!(json.contains("\"category\":\"deposit\""));
        assert!(json.contains("intent-123"));
        assert!(json.contains("\"duration_ms\":42"));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(LogLevel::from("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::from("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::from("warning"), LogLevel::Warn);
        assert_eq!(LogLevel::from("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_correlation_ids_unique() {
        let id1 = generate_correlation_id();
        let id2 = generate_correlation_id();

        assert_eq!(id1.len(), 32);
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_helpers_do_not_panic_without_subscriber() {
        log_stake_event("created", "i1", "user", Decimal::ONE, None, None);
        log_deposit_event("unmatched", Some("sig:0"), "user", Decimal::ONE, None, None);
        log_operator_alert("refund_failed", "i1", serde_json::json!({"error": "rpc"}));
    }
}
