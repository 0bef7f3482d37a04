//! Common Error Types for the StakeVault Backend
//!
//! Root error aggregating the per-layer errors for the binary and CLI paths.
//! Request handling maps `SettlementError` directly (see `api::error`).

use thiserror::Error;

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::settlement::SettlementError;
use crate::sol_client::LedgerError;
use crate::storage::StorageError;

/// Root error type for the StakeVault backend
#[derive(Debug, Error)]
pub enum StakeVaultError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("settlement error: {0}")]
    Settlement(#[from] SettlementError),

    /// HTTP server errors
    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StakeVaultError {
    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            StakeVaultError::Ledger(LedgerError::Rpc(_)) => true,
            StakeVaultError::Storage(StorageError::Connection(_) | StorageError::Database(_)) => true,
            StakeVaultError::Settlement(e) => e.is_retryable(),
            StakeVaultError::Io(_) => true,
            _ => false,
        }
    }

    /// Get error code for API responses and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            StakeVaultError::Config(_) => "CONFIG_ERROR",
            StakeVaultError::Logging(_) => "LOGGING_ERROR",
            StakeVaultError::Ledger(_) => "SOLANA_ERROR",
            StakeVaultError::Storage(_) => "STORAGE_ERROR",
            StakeVaultError::Settlement(e) => e.error_code(),
            StakeVaultError::Api(_) => "API_ERROR",
            StakeVaultError::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using StakeVaultError
pub type Result<T> = std::result::Result<T, StakeVaultError>;
