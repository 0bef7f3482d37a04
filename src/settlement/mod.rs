//! Settlement and Reconciliation Engine
//!
//! Owns the stake and unstake sagas. Every step is a conditional transition
//! in the [`SettlementStore`]; calls to the [`SettlementLedger`] are the only
//! suspension points and no lock is held across them.
//!
//! - [`intake`] - create stake intents
//! - [`reconciler`] - match observed deposits to pending intents
//! - [`orchestrator`] - mint, or refund on mint failure
//! - [`withdrawal`] - two-phase co-signed unstake
//! - [`status`] - read-only projections

pub mod intake;
pub mod orchestrator;
pub mod reconciler;
pub mod status;
pub mod withdrawal;

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::config::SettlementSettings;
use crate::sol_client::{LedgerError, SettlementLedger};
use crate::storage::{SettlementStore, StorageError};
use crate::types::units::{to_base_units, UnitsError};

pub use reconciler::{ReconcileOutcome, ReconcileReport};

/// Settlement errors
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Caller input rejected; the message is safe to return
    #[error("{0}")]
    Validation(String),

    #[error("transaction not found: {0}")]
    NotFound(String),

    /// Another request is settling the same intent
    #[error("settlement already in progress")]
    InProgress,

    #[error("mint failed: {0}")]
    MintFailure(String),

    #[error("refund failed: {0}")]
    CompensationFailure(String),

    #[error("submission failed: {0}")]
    SubmissionFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl From<UnitsError> for SettlementError {
    fn from(e: UnitsError) -> Self {
        SettlementError::Validation(e.to_string())
    }
}

impl SettlementError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether a retry of the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::InProgress
                | SettlementError::Storage(StorageError::Connection(_) | StorageError::Database(_))
                | SettlementError::Ledger(LedgerError::Rpc(_))
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            SettlementError::Validation(_) => "VALIDATION_ERROR",
            SettlementError::NotFound(_) => "NOT_FOUND",
            SettlementError::InProgress => "IN_PROGRESS",
            SettlementError::MintFailure(_) => "MINT_FAILED",
            SettlementError::CompensationFailure(_) => "COMPENSATION_FAILED",
            SettlementError::SubmissionFailure(_) => "SUBMISSION_FAILED",
            SettlementError::Storage(_) => "STORAGE_ERROR",
            SettlementError::Ledger(_) => "SOLANA_ERROR",
        }
    }
}

/// The engine: store, ledger seam and settings
pub struct SettlementEngine {
    store: Arc<dyn SettlementStore>,
    ledger: Arc<dyn SettlementLedger>,
    settings: SettlementSettings,
}

/// Shared engine handle for request handlers
pub type SharedEngine = Arc<SettlementEngine>;

impl SettlementEngine {
    pub fn new(
        store: Arc<dyn SettlementStore>,
        ledger: Arc<dyn SettlementLedger>,
        settings: SettlementSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            settings,
        }
    }

    pub fn settings(&self) -> &SettlementSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn SettlementStore> {
        &self.store
    }

    /// Parse a wallet address
    pub(crate) fn validate_user(&self, user: &str) -> Result<Pubkey, SettlementError> {
        let trimmed = user.trim();
        if trimmed.is_empty() {
            return Err(SettlementError::validation("wallet address is required"));
        }
        Pubkey::from_str(trimmed)
            .map_err(|_| SettlementError::validation(format!("invalid wallet address: {}", trimmed)))
    }

    /// Check an amount against precision and configured limits; returns base units
    pub(crate) fn validate_amount(&self, amount: Decimal) -> Result<u64, SettlementError> {
        let units = to_base_units(amount)?;

        if amount < self.settings.min_amount || amount > self.settings.max_amount {
            return Err(SettlementError::Validation(format!(
                "amount must be between {} and {} {}",
                self.settings.min_amount.normalize(),
                self.settings.max_amount.normalize(),
                self.settings.base_asset
            )));
        }

        Ok(units)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::sol_client::MockSettlementLedger;
    use crate::storage::MemoryStore;

    pub fn settings() -> SettlementSettings {
        SettlementSettings {
            vault_address: Pubkey::new_unique(),
            derivative_mint: Pubkey::new_unique(),
            base_asset: "SOL".to_string(),
            min_amount: Decimal::new(1, 3),
            max_amount: Decimal::from(1_000),
            history_limit: 20,
        }
    }

    pub fn engine(ledger: MockSettlementLedger) -> (SettlementEngine, Arc<MemoryStore>) {
        engine_with(ledger, settings())
    }

    pub fn engine_with(
        ledger: MockSettlementLedger,
        settings: SettlementSettings,
    ) -> (SettlementEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = SettlementEngine::new(store.clone(), Arc::new(ledger), settings);
        (engine, store)
    }

    pub fn wallet() -> String {
        Pubkey::new_unique().to_string()
    }

    pub fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }
}
