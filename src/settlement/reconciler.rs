//! Deposit Reconciler
//!
//! Matches transfers observed by the external event source to pending stake
//! intents, claims the match and hands it to the orchestrator.
//!
//! Delivery is at-least-once. A transfer is consumed at most once because
//! its `<signature>:<index>` reference is recorded by the claim under a
//! uniqueness constraint, and only the claim winner may mint.

use rust_decimal::Decimal;
use serde::Serialize;

use super::{SettlementEngine, SettlementError};
use crate::logging::log_deposit_event;
use crate::storage::{IntentLedger, StorageError};
use crate::types::deposit::{DepositTransaction, NativeTransfer};
use crate::types::intent::StakeIntent;
use crate::types::units::from_base_units;

/// What happened to one observed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Derivative minted and vault credited
    Completed { intent_id: String, signature: String },
    /// Mint failed, deposit returned
    Refunded { intent_id: String, signature: String },
    /// Mint and refund both failed; intent is `failed`
    CompensationFailed { intent_id: String },
    /// No pending intent for this sender and amount
    Unmatched,
    /// Transfer already consumed by an earlier delivery
    Duplicate,
    /// A concurrent delivery claimed the intent first
    AlreadyClaimed,
    /// Not addressed to the vault, zero, or without a transaction signature
    Ignored,
}

/// Per-batch counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub completed: usize,
    pub refunded: usize,
    pub compensation_failed: usize,
    pub unmatched: usize,
    pub duplicates: usize,
    pub ignored: usize,
    /// Internal errors; the source should redeliver
    pub errors: usize,
}

impl ReconcileReport {
    pub fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Completed { .. } => self.completed += 1,
            ReconcileOutcome::Refunded { .. } => self.refunded += 1,
            ReconcileOutcome::CompensationFailed { .. } => self.compensation_failed += 1,
            ReconcileOutcome::Unmatched => self.unmatched += 1,
            ReconcileOutcome::Duplicate | ReconcileOutcome::AlreadyClaimed => self.duplicates += 1,
            ReconcileOutcome::Ignored => self.ignored += 1,
        }
    }

    /// No internal errors: safe to acknowledge the delivery
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

impl SettlementEngine {
    /// Reconcile a delivered batch; failures are isolated per transfer
    pub async fn reconcile_batch(&self, batch: &[DepositTransaction]) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for tx in batch {
            for (index, transfer) in tx.native_transfers.iter().enumerate() {
                match self.reconcile_transfer(tx, index, transfer).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(e) => {
                        report.errors += 1;
                        log_deposit_event(
                            "reconcile_error",
                            tx.deposit_ref(index).as_deref(),
                            &transfer.from_user_account,
                            from_base_units(transfer.amount),
                            None,
                            Some(&e.to_string()),
                        );
                    }
                }
            }
        }

        tracing::info!(
            target: "stakevault::deposit",
            completed = report.completed,
            refunded = report.refunded,
            compensation_failed = report.compensation_failed,
            unmatched = report.unmatched,
            duplicates = report.duplicates,
            ignored = report.ignored,
            errors = report.errors,
            "Deposit batch reconciled"
        );

        report
    }

    /// Reconcile the `index`th transfer of `tx`
    pub async fn reconcile_transfer(
        &self,
        tx: &DepositTransaction,
        index: usize,
        transfer: &NativeTransfer,
    ) -> Result<ReconcileOutcome, SettlementError> {
        if transfer.to_user_account != self.settings.vault_address.to_string() || transfer.amount == 0 {
            return Ok(ReconcileOutcome::Ignored);
        }

        let amount = from_base_units(transfer.amount);
        let from = transfer.from_user_account.as_str();

        // Without a ledger signature a redelivery cannot be told apart from a new deposit
        let Some(deposit_ref) = tx.deposit_ref(index) else {
            tracing::warn!(
                target: "stakevault::deposit",
                from,
                amount = %amount,
                "Deposit without a transaction signature ignored"
            );
            log_deposit_event("unsigned", None, from, amount, None, None);
            return Ok(ReconcileOutcome::Ignored);
        };
        let r = deposit_ref.as_str();

        if let Some(existing) = self.store.find_by_deposit_ref(r).await? {
            log_deposit_event("duplicate", Some(r), from, amount, Some(&existing.id), None);
            return Ok(ReconcileOutcome::Duplicate);
        }

        let intent = match self.find_match(tx, from, amount).await? {
            Some(intent) => intent,
            None => {
                log_deposit_event("unmatched", Some(r), from, amount, None, None);
                return Ok(ReconcileOutcome::Unmatched);
            }
        };

        match self.store.claim_for_minting(&intent.id, Some(r)).await {
            Ok(true) => {}
            Ok(false) => {
                log_deposit_event("already_claimed", Some(r), from, amount, Some(&intent.id), None);
                return Ok(ReconcileOutcome::AlreadyClaimed);
            }
            Err(StorageError::Duplicate(_)) => {
                log_deposit_event("duplicate", Some(r), from, amount, Some(&intent.id), None);
                return Ok(ReconcileOutcome::Duplicate);
            }
            Err(e) => return Err(e.into()),
        }

        log_deposit_event("matched", Some(r), from, amount, Some(&intent.id), None);
        self.settle_claimed(&intent).await
    }

    /// Exact lookup by correlation token, else most recent `(user, amount)` match
    ///
    /// A memo that is not an intent ID (other programs write memos too) falls
    /// back to amount matching; a memo naming an intent that does not fit the
    /// transfer does not.
    async fn find_match(
        &self,
        tx: &DepositTransaction,
        from: &str,
        amount: Decimal,
    ) -> Result<Option<StakeIntent>, SettlementError> {
        if let Some(token) = tx.correlation_token() {
            if uuid::Uuid::parse_str(token).is_ok() {
                let intent = self.store.get_intent(token).await?;
                return Ok(intent.filter(|i| i.matches_deposit(from, amount)));
            }
        }

        Ok(self.store.find_pending_by_user_and_amount(from, amount).await?)
    }
}
