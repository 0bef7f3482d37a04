//! Shared Types Module
//!
//! Data types shared across the settlement engine.

pub mod api;
pub mod deposit;
pub mod intent;
pub mod unstake;
pub mod units;
pub mod vault;

// Re-exports for convenience
pub use api::{
    HistoryQuery, IntentKind, IntentSummary, StakeInitRequest, StakeInitResponse, StatusResponse,
    UnresolvedReport, UnstakePreparedResponse, UnstakeRequest, UnstakeSubmittedResponse,
    VaultSummary,
};
pub use deposit::{DepositTransaction, DepositWebhookBody, NativeTransfer};
pub use intent::{now_millis, IntentStatus, StakeIntent};
pub use unstake::{UnstakeIntent, UnstakeStatus};
pub use units::{
    format_amount, from_base_units, from_signed_base_units, to_base_units, to_signed_base_units,
    UnitsError, BASE_DECIMALS, LAMPORTS_PER_SOL,
};
pub use vault::{VaultLedger, VAULT_LEDGER_ID};
