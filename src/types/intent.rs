//! Stake Intent Types
//!
//! A stake intent records one stake attempt through its lifecycle:
//!
//! ```text
//! pending → minting → completed
//!              └────→ refunding → refunded
//!                          └────→ failed   (compensation failed, operator required)
//! ```
//!
//! `minting` and `refunding` are persisted saga steps: a crash between the
//! mint and the compensating refund leaves a durable marker of how far the
//! settlement got.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Status of a stake intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    /// Waiting for the deposit to be observed
    Pending,
    /// Deposit matched and claimed, mint in flight
    Minting,
    /// Derivative minted, vault credited
    Completed,
    /// Mint failed, compensating refund in flight
    Refunding,
    /// Deposit returned to the sender
    Refunded,
    /// Refund failed; terminal-unresolved
    Failed,
}

impl Default for IntentStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl IntentStatus {
    /// Whether `self → next` is an edge of the saga state machine
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Minting)
                | (Self::Minting, Self::Completed)
                | (Self::Minting, Self::Refunding)
                | (Self::Refunding, Self::Refunded)
                | (Self::Refunding, Self::Failed)
        )
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Minting => "minting",
            Self::Completed => "completed",
            Self::Refunding => "refunding",
            Self::Refunded => "refunded",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "minting" => Ok(Self::Minting),
            "completed" => Ok(Self::Completed),
            "refunding" => Ok(Self::Refunding),
            "refunded" => Ok(Self::Refunded),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("unknown status: {}", s)),
        }
    }
}

/// A stake intent: one per stake attempt, never deleted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StakeIntent {
    /// Unique intent ID, returned to the caller as the correlation token
    pub id: String,
    /// Depositor wallet address (base58)
    pub user: String,
    /// Symbol of the asset the vault receives
    pub asset_received: String,
    /// Expected deposit amount
    pub amount_received: Decimal,
    /// Derivative mint address
    pub derivative_asset: String,
    /// Derivative amount to mint (1:1 with the deposit)
    pub amount_to_mint: Decimal,
    /// Current status
    pub status: IntentStatus,
    /// Mint or refund signature once settled
    pub settlement_signature: Option<String>,
    /// `<deposit signature>:<transfer index>` of the matched deposit
    pub deposit_ref: Option<String>,
    /// Internal diagnostic if failed
    pub error: Option<String>,
    /// Creation time (unix millis)
    pub created_at: u64,
    /// Last update (unix millis)
    pub updated_at: u64,
}

impl StakeIntent {
    /// Create a new pending intent
    pub fn new(
        user: String,
        asset_received: String,
        amount_received: Decimal,
        derivative_asset: String,
    ) -> Self {
        let now = now_millis();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user,
            asset_received,
            amount_received,
            derivative_asset,
            amount_to_mint: amount_received,
            status: IntentStatus::Pending,
            settlement_signature: None,
            deposit_ref: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether a deposit from `user` of `amount` satisfies this intent
    pub fn matches_deposit(&self, user: &str, amount: Decimal) -> bool {
        self.status == IntentStatus::Pending && self.user == user && self.amount_received == amount
    }

    /// Apply a transition in place, updating the timestamp
    pub fn apply_transition(&mut self, next: IntentStatus, settlement_signature: Option<&str>) {
        self.status = next;
        if let Some(sig) = settlement_signature {
            self.settlement_signature = Some(sig.to_string());
        }
        self.touch();
    }

    /// Update the last-modified timestamp
    pub fn touch(&mut self) {
        self.updated_at = now_millis();
    }
}

/// Current unix time in milliseconds
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            IntentStatus::Pending,
            IntentStatus::Minting,
            IntentStatus::Completed,
            IntentStatus::Refunding,
            IntentStatus::Refunded,
            IntentStatus::Failed,
        ] {
            assert_eq!(IntentStatus::from_str(&status.to_string()), Ok(status));
        }
        assert!(IntentStatus::from_str("settled").is_err());
    }

    #[test]
    fn test_saga_edges() {
        assert!(IntentStatus::Pending.can_transition_to(IntentStatus::Minting));
        assert!(IntentStatus::Minting.can_transition_to(IntentStatus::Completed));
        assert!(IntentStatus::Refunding.can_transition_to(IntentStatus::Failed));
        assert!(!IntentStatus::Pending.can_transition_to(IntentStatus::Completed));
        assert!(!IntentStatus::Completed.can_transition_to(IntentStatus::Refunding));
        assert!(!IntentStatus::Refunded.can_transition_to(IntentStatus::Pending));
        assert!(!IntentStatus::Failed.can_transition_to(IntentStatus::Refunding));
    }

    #[test]
    fn test_new_intent() {
        let amount = Decimal::from_str("2.0").unwrap();
        let intent = StakeIntent::new("user".into(), "SOL".into(), amount, "mint".into());

        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.amount_to_mint, amount);
        assert!(intent.matches_deposit("user", Decimal::from(2)));
        assert!(!intent.matches_deposit("other", Decimal::from(2)));
        assert!(!intent.matches_deposit("user", Decimal::from(3)));
    }
}
