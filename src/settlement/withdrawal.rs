//! Withdrawal Saga Coordinator
//!
//! Two-phase, co-signed unstake:
//!
//! 1. `prepare_unstake` builds a burn-and-payout transaction pre-signed by the
//!    vault authority and records its message hash (`awaiting_signature`).
//! 2. `finalize_unstake` accepts the user-signed transaction, verifies every
//!    signature, submits it and settles the intent together with the vault
//!    debit (`submitted → settled`).
//!
//! The message hash is the idempotency key: resubmitting a settled
//! transaction returns the stored signature without a second debit.

use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use solana_sdk::transaction::Transaction;

use super::{SettlementEngine, SettlementError};
use crate::logging::{log_operator_alert, log_security_event, log_withdrawal_event};
use crate::sol_client::{decode_transaction, encode_transaction};
use crate::storage::{SettlementStore, StorageError, UnstakeLedger, VaultAccumulator};
use crate::types::api::{UnstakePreparedResponse, UnstakeSubmittedResponse};
use crate::types::unstake::{UnstakeIntent, UnstakeStatus};

/// Hex SHA-256 of the serialized transaction message
pub fn message_hash(tx: &Transaction) -> String {
    hex::encode(Sha256::digest(tx.message_data()))
}

/// Every required signer slot is populated and verifies
fn fully_signed(tx: &Transaction) -> bool {
    tx.signatures.len() == tx.message.header.num_required_signatures as usize
        && tx.is_signed()
        && tx.verify().is_ok()
}

impl SettlementEngine {
    /// Phase 1: create the unstake intent and the transaction for the user to sign
    pub async fn prepare_unstake(
        &self,
        user: &str,
        amount: Decimal,
    ) -> Result<UnstakePreparedResponse, SettlementError> {
        let user_key = self.validate_user(user)?;
        let units = self.validate_amount(amount)?;

        let vault = self.store.get_or_create().await?;
        if amount > vault.total_minted {
            return Err(SettlementError::validation(
                "amount exceeds outstanding staked supply",
            ));
        }

        let authority = self.ledger.authority();
        let reserves = self.ledger.balance(&authority).await?;
        if reserves < units {
            tracing::warn!(
                target: "stakevault::withdrawal",
                reserves,
                requested = units,
                "Vault reserves below requested payout"
            );
            return Err(SettlementError::validation(
                "vault cannot cover this payout right now",
            ));
        }

        let intent = UnstakeIntent::new(user_key.to_string(), amount.normalize());
        self.store.insert_unstake(&intent).await?;

        let tx = match self
            .ledger
            .build_unstake_transaction(&user_key, units, &intent.id)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.abandon_unstake(&intent, "build_failed", &e.to_string()).await?;
                return Err(e.into());
            }
        };

        let encoded = match encode_transaction(&tx) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.abandon_unstake(&intent, "encode_failed", &e.to_string()).await?;
                return Err(e.into());
            }
        };

        match self.store.attach_payload(&intent.id, &message_hash(&tx)).await {
            Ok(true) => {}
            Ok(false) => {
                let err = StorageError::InvalidData(format!(
                    "unstake {} left initiated before payload was attached",
                    intent.id
                ));
                self.abandon_unstake(&intent, "attach_failed", &err.to_string()).await?;
                return Err(err.into());
            }
            Err(e) => {
                self.abandon_unstake(&intent, "attach_failed", &e.to_string()).await?;
                return Err(e.into());
            }
        }

        log_withdrawal_event("prepared", &intent.id, &intent.user, intent.amount, None, None);

        Ok(UnstakePreparedResponse {
            tx: encoded,
            unstake_id: intent.id,
        })
    }

    /// `initiated → failed` for an intent whose phase-1 transaction never reached the user
    async fn abandon_unstake(
        &self,
        intent: &UnstakeIntent,
        event_type: &str,
        error: &str,
    ) -> Result<(), SettlementError> {
        self.store
            .transition_unstake(
                &intent.id,
                UnstakeStatus::Initiated,
                UnstakeStatus::Failed,
                None,
                Some(error),
            )
            .await?;
        log_withdrawal_event(event_type, &intent.id, &intent.user, intent.amount, None, Some(error));
        Ok(())
    }

    /// Phase 2: verify, submit and settle the user-signed transaction
    pub async fn finalize_unstake(
        &self,
        user: &str,
        amount: Decimal,
        signed_payload: &str,
        correlation_id: Option<&str>,
    ) -> Result<UnstakeSubmittedResponse, SettlementError> {
        let user_key = self.validate_user(user)?;

        let tx = decode_transaction(signed_payload)
            .map_err(|_| SettlementError::validation("signed transaction could not be decoded"))?;

        if !fully_signed(&tx) {
            log_security_event(
                "unstake_signature_rejected",
                false,
                serde_json::json!({
                    "user": user_key.to_string(),
                    "required": tx.message.header.num_required_signatures,
                    "provided": tx.signatures.len(),
                }),
                correlation_id,
            );
            return Err(SettlementError::validation(
                "transaction is missing required signatures",
            ));
        }

        let hash = message_hash(&tx);
        let intent = match self.store.find_unstake_by_message_hash(&hash).await? {
            Some(intent) if intent.user == user_key.to_string() => intent,
            found => {
                log_security_event(
                    "unstake_payload_unknown",
                    false,
                    serde_json::json!({
                        "user": user_key.to_string(),
                        "message_hash": hash,
                        "owner_mismatch": found.is_some(),
                    }),
                    correlation_id,
                );
                return Err(SettlementError::validation(
                    "transaction does not match a pending unstake",
                ));
            }
        };

        if intent.amount != amount {
            return Err(SettlementError::validation(
                "amount does not match the prepared unstake",
            ));
        }

        match intent.status {
            UnstakeStatus::Settled => {
                return intent
                    .settlement_signature
                    .map(|tx_sig| UnstakeSubmittedResponse { success: true, tx_sig })
                    .ok_or_else(|| {
                        StorageError::InvalidData(format!("settled unstake {} has no signature", intent.id)).into()
                    });
            }
            UnstakeStatus::Submitted => return Err(SettlementError::InProgress),
            UnstakeStatus::Failed | UnstakeStatus::Initiated => {
                return Err(SettlementError::validation(
                    "this unstake can no longer be submitted, start a new unstake",
                ));
            }
            UnstakeStatus::AwaitingSignature => {}
        }

        if !self
            .store
            .transition_unstake(
                &intent.id,
                UnstakeStatus::AwaitingSignature,
                UnstakeStatus::Submitted,
                None,
                None,
            )
            .await?
        {
            return Err(SettlementError::InProgress);
        }

        let signature = match self.ledger.submit_transaction(&tx).await {
            Ok(sig) => sig,
            Err(e) => {
                self.store
                    .transition_unstake(
                        &intent.id,
                        UnstakeStatus::Submitted,
                        UnstakeStatus::Failed,
                        None,
                        Some(&e.to_string()),
                    )
                    .await?;
                log_withdrawal_event(
                    "submission_failed",
                    &intent.id,
                    &intent.user,
                    intent.amount,
                    None,
                    Some(&e.to_string()),
                );
                return Err(SettlementError::SubmissionFailure(e.to_string()));
            }
        };

        match self.store.settle_unstake(&intent.id, &signature, intent.amount).await {
            Ok(true) => {}
            Ok(false) => {
                let err = StorageError::InvalidData(format!(
                    "unstake {} left submitted before settlement",
                    intent.id
                ));
                self.alert_unrecorded_payout(&intent, &signature, &err.to_string());
                return Err(err.into());
            }
            Err(e) => {
                self.alert_unrecorded_payout(&intent, &signature, &e.to_string());
                return Err(e.into());
            }
        }

        log_withdrawal_event(
            "settled",
            &intent.id,
            &intent.user,
            intent.amount,
            Some(&signature),
            None,
        );

        Ok(UnstakeSubmittedResponse {
            success: true,
            tx_sig: signature,
        })
    }

    fn alert_unrecorded_payout(&self, intent: &UnstakeIntent, signature: &str, error: &str) {
        log_operator_alert(
            "payout_not_recorded",
            &intent.id,
            serde_json::json!({
                "user": intent.user,
                "amount": intent.amount.to_string(),
                "signature": signature,
                "error": error,
            }),
        );
    }
}
