//! Storage Trait Definitions
//!
//! Abstract storage interfaces for stake intents, unstake intents and the
//! vault ledger. Implementations use SQLite (production) or in-memory (testing).
//!
//! Every state change is a conditional update keyed on the current status:
//! a `false` return means another task got there first, never an error.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::intent::{IntentStatus, StakeIntent};
use crate::types::unstake::{UnstakeIntent, UnstakeStatus};
use crate::types::vault::VaultLedger;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store of stake intents
#[async_trait]
pub trait IntentLedger: Send + Sync {
    /// Insert a new intent
    async fn insert_intent(&self, intent: &StakeIntent) -> StorageResult<()>;

    /// Get an intent by ID
    async fn get_intent(&self, id: &str) -> StorageResult<Option<StakeIntent>>;

    /// Most recently created pending intent for `(user, amount)`
    async fn find_pending_by_user_and_amount(
        &self,
        user: &str,
        amount: Decimal,
    ) -> StorageResult<Option<StakeIntent>>;

    /// Intent that already consumed the given deposit reference
    async fn find_by_deposit_ref(&self, deposit_ref: &str) -> StorageResult<Option<StakeIntent>>;

    /// Conditional status transition; returns whether it applied.
    /// Pairs outside the state machine never apply.
    async fn transition(
        &self,
        id: &str,
        expected: IntentStatus,
        next: IntentStatus,
        settlement_signature: Option<&str>,
    ) -> StorageResult<bool>;

    /// Conditional `pending → minting` that records the deposit reference
    ///
    /// Only the caller that wins this claim may invoke the mint authority.
    async fn claim_for_minting(&self, id: &str, deposit_ref: Option<&str>) -> StorageResult<bool>;

    /// Conditional transition to `failed` recording a diagnostic
    async fn fail_intent(&self, id: &str, expected: IntentStatus, error: &str)
        -> StorageResult<bool>;

    /// Intents of a user, newest first
    async fn list_intents_by_user(&self, user: &str, limit: usize)
        -> StorageResult<Vec<StakeIntent>>;

    /// Intents in a status, oldest first
    async fn list_intents_by_status(&self, status: IntentStatus)
        -> StorageResult<Vec<StakeIntent>>;
}

/// The singleton vault aggregate
#[async_trait]
pub trait VaultAccumulator: Send + Sync {
    /// Current ledger, created empty on first access
    async fn get_or_create(&self) -> StorageResult<VaultLedger>;

    /// Atomically add signed deltas to both totals
    async fn apply_delta(&self, deposit_delta: Decimal, mint_delta: Decimal)
        -> StorageResult<VaultLedger>;
}

/// Durable store of unstake intents
#[async_trait]
pub trait UnstakeLedger: Send + Sync {
    /// Insert a new unstake intent
    async fn insert_unstake(&self, intent: &UnstakeIntent) -> StorageResult<()>;

    /// Get an unstake intent by ID
    async fn get_unstake(&self, id: &str) -> StorageResult<Option<UnstakeIntent>>;

    /// Look up the intent a phase-1 transaction was built for
    async fn find_unstake_by_message_hash(
        &self,
        message_hash: &str,
    ) -> StorageResult<Option<UnstakeIntent>>;

    /// Record the phase-1 message hash: `initiated → awaiting_signature`
    async fn attach_payload(&self, id: &str, message_hash: &str) -> StorageResult<bool>;

    /// Conditional status transition; returns whether it applied.
    /// Pairs outside the state machine never apply.
    async fn transition_unstake(
        &self,
        id: &str,
        expected: UnstakeStatus,
        next: UnstakeStatus,
        settlement_signature: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<bool>;

    /// Unstake intents of a user, newest first
    async fn list_unstakes_by_user(&self, user: &str, limit: usize)
        -> StorageResult<Vec<UnstakeIntent>>;

    /// Unstake intents in a status, oldest first
    async fn list_unstakes_by_status(&self, status: UnstakeStatus)
        -> StorageResult<Vec<UnstakeIntent>>;
}

/// Full settlement store: the ledgers plus the compound units that pair an
/// intent transition with a vault delta.
///
/// Implementations:
/// - `SqliteStore` - Production storage with SQLite
/// - `MemoryStore` - In-memory storage for testing
#[async_trait]
pub trait SettlementStore: IntentLedger + VaultAccumulator + UnstakeLedger {
    /// `minting → completed` and `+amount` on both totals, atomically
    ///
    /// Returns `false` (and credits nothing) if the intent was not `minting`.
    async fn complete_stake(
        &self,
        id: &str,
        settlement_signature: &str,
        amount: Decimal,
    ) -> StorageResult<bool>;

    /// `submitted → settled` and `-amount` on both totals, atomically
    ///
    /// Returns `false` (and debits nothing) if the intent was not `submitted`.
    async fn settle_unstake(
        &self,
        id: &str,
        settlement_signature: &str,
        amount: Decimal,
    ) -> StorageResult<bool>;
}
