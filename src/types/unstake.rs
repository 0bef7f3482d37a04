//! Unstake Intent Types
//!
//! Tracks a withdrawal through the two-phase co-signed saga:
//! initiated → awaiting_signature → submitted → settled, with submitted → failed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::intent::now_millis;

/// Status of an unstake intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnstakeStatus {
    /// Record created, transaction being built
    Initiated,
    /// Vault pre-signed transaction handed to the user
    AwaitingSignature,
    /// Fully signed transaction submitted to the ledger
    Submitted,
    /// Confirmed on chain and vault debited
    Settled,
    /// Build or submission failed
    Failed,
}

impl Default for UnstakeStatus {
    fn default() -> Self {
        Self::Initiated
    }
}

impl UnstakeStatus {
    /// Whether `self → next` is an edge of the withdrawal state machine
    pub fn can_transition_to(&self, next: UnstakeStatus) -> bool {
        matches!(
            (self, next),
            (Self::Initiated, Self::AwaitingSignature)
                | (Self::Initiated, Self::Failed)
                | (Self::AwaitingSignature, Self::Submitted)
                | (Self::Submitted, Self::Settled)
                | (Self::Submitted, Self::Failed)
        )
    }
}

impl std::fmt::Display for UnstakeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::AwaitingSignature => "awaiting_signature",
            Self::Submitted => "submitted",
            Self::Settled => "settled",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for UnstakeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initiated" => Ok(Self::Initiated),
            "awaiting_signature" => Ok(Self::AwaitingSignature),
            "submitted" => Ok(Self::Submitted),
            "settled" => Ok(Self::Settled),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// An unstake intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstakeIntent {
    /// Unique ID, embedded in the transaction memo
    pub id: String,
    /// Withdrawing wallet address (base58)
    pub user: String,
    /// Amount burned and paid out
    pub amount: Decimal,
    pub status: UnstakeStatus,
    /// Hex SHA-256 of the phase-1 transaction message
    pub message_hash: Option<String>,
    /// Signature of the confirmed burn-and-payout transaction
    pub settlement_signature: Option<String>,
    pub error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl UnstakeIntent {
    pub fn new(user: String, amount: Decimal) -> Self {
        let now = now_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            amount,
            status: UnstakeStatus::Initiated,
            message_hash: None,
            settlement_signature: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}
