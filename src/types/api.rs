//! HTTP Request/Response Types
//!
//! JSON bodies use camelCase to match the wallet frontend. Amounts are
//! accepted as numbers or strings and serialized as strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::intent::StakeIntent;
use super::unstake::UnstakeIntent;

/// POST /stake-init
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInitRequest {
    pub user_wallet: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInitResponse {
    pub tx_id: String,
}

/// POST /unstake (phase 1 without `signed_burn_tx`, phase 2 with it)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeRequest {
    pub user_wallet: String,
    pub amount: Decimal,
    #[serde(default)]
    pub signed_burn_tx: Option<String>,
}

/// Phase 1 response: base64 transaction awaiting the user's signature
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakePreparedResponse {
    pub tx: String,
    pub unstake_id: String,
}

/// Phase 2 response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeSubmittedResponse {
    pub success: bool,
    pub tx_sig: String,
}

/// GET /transactions/status/:id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// GET /transactions/status?user=...&limit=...
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    pub user: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Which saga an intent belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Stake,
    Unstake,
}

/// Caller-facing projection of a stake or unstake intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentSummary {
    pub id: String,
    pub kind: IntentKind,
    pub user: String,
    pub amount: Decimal,
    pub status: String,
    pub settlement_signature: Option<String>,
    pub created_at: u64,
}

impl From<&StakeIntent> for IntentSummary {
    fn from(intent: &StakeIntent) -> Self {
        Self {
            id: intent.id.clone(),
            kind: IntentKind::Stake,
            user: intent.user.clone(),
            amount: intent.amount_received,
            status: intent.status.to_string(),
            settlement_signature: intent.settlement_signature.clone(),
            created_at: intent.created_at,
        }
    }
}

impl From<&UnstakeIntent> for IntentSummary {
    fn from(intent: &UnstakeIntent) -> Self {
        Self {
            id: intent.id.clone(),
            kind: IntentKind::Unstake,
            user: intent.user.clone(),
            amount: intent.amount,
            status: intent.status.to_string(),
            settlement_signature: intent.settlement_signature.clone(),
            created_at: intent.created_at,
        }
    }
}

/// GET /vault
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultSummary {
    pub total_deposited: Decimal,
    pub total_minted: Decimal,
    pub pegged: bool,
    pub version: u64,
    /// On-chain base asset held by the vault authority, if the ledger answered
    pub authority_balance: Option<Decimal>,
}

/// GET /transactions/unresolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresolvedReport {
    /// Refund failed; needs manual remediation
    pub failed_stakes: Vec<IntentSummary>,
    /// Stuck between mint and settlement (minting/refunding)
    pub in_flight_stakes: Vec<IntentSummary>,
    /// Submitted without a recorded outcome, or failed
    pub unstakes: Vec<IntentSummary>,
}

impl UnresolvedReport {
    pub fn is_empty(&self) -> bool {
        self.failed_stakes.is_empty() && self.in_flight_stakes.is_empty() && self.unstakes.is_empty()
    }
}
