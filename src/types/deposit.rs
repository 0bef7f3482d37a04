//! Deposit Event Types
//!
//! Payload pushed by the external event source to `POST /deposit-webhook`.
//! The shape follows Helius enhanced-transaction webhooks (`nativeTransfers`,
//! amounts in lamports) plus an optional `memo` carrying the intent id.

use serde::{Deserialize, Serialize};

/// One native (base asset) transfer inside an observed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    pub from_user_account: String,
    pub to_user_account: String,
    /// Amount in lamports
    pub amount: u64,
}

/// An observed ledger transaction with its native transfers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositTransaction {
    /// Ledger transaction signature; keys deduplication when present
    #[serde(default)]
    pub signature: Option<String>,
    /// Intent id round-tripped by the client in a memo instruction
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
}

impl DepositTransaction {
    /// Deduplication key of the `index`th transfer
    pub fn deposit_ref(&self, index: usize) -> Option<String> {
        self.signature
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|sig| format!("{}:{}", sig, index))
    }

    /// Memo, trimmed, if non-empty
    pub fn correlation_token(&self) -> Option<&str> {
        self.memo.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }
}

/// Webhook body: either a batch or a single transaction
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DepositWebhookBody {
    Batch(Vec<DepositTransaction>),
    Single(DepositTransaction),
}

impl DepositWebhookBody {
    pub fn into_batch(self) -> Vec<DepositTransaction> {
        match self {
            Self::Batch(txs) => txs,
            Self::Single(tx) => vec![tx],
        }
    }
}
