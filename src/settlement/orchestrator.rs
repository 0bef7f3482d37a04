//! Mint/Refund Orchestrator
//!
//! Drives a claimed (`minting`) intent to a terminal state:
//!
//! - mint succeeds: `minting → completed` and the vault is credited in one unit
//! - mint fails: `minting → refunding`, refund the deposit, `refunding → refunded`
//! - refund fails: `refunding → failed`, operator alert, no retry

use solana_sdk::pubkey::Pubkey;

use super::reconciler::ReconcileOutcome;
use super::{SettlementEngine, SettlementError};
use crate::logging::{log_operator_alert, log_stake_event};
use crate::sol_client::{parse_pubkey, LedgerError};
use crate::storage::{IntentLedger, SettlementStore, StorageError};
use crate::types::intent::{IntentStatus, StakeIntent};
use crate::types::units::to_base_units;

impl SettlementEngine {
    /// Settle an intent this task has claimed for minting
    pub async fn settle_claimed(&self, intent: &StakeIntent) -> Result<ReconcileOutcome, SettlementError> {
        let recipient = parse_pubkey(&intent.user)?;
        let units = to_base_units(intent.amount_to_mint)?;

        match self.ledger.mint_derivative(&recipient, units).await {
            Ok(signature) => self.record_mint(intent, &signature).await,
            Err(e) => self.compensate(intent, &recipient, e).await,
        }
    }

    async fn record_mint(&self, intent: &StakeIntent, signature: &str) -> Result<ReconcileOutcome, SettlementError> {
        let recorded = self
            .store
            .complete_stake(&intent.id, signature, intent.amount_to_mint)
            .await;

        match recorded {
            Ok(true) => {
                log_stake_event(
                    "minted",
                    &intent.id,
                    &intent.user,
                    intent.amount_to_mint,
                    Some(signature),
                    None,
                );
                Ok(ReconcileOutcome::Completed {
                    intent_id: intent.id.clone(),
                    signature: signature.to_string(),
                })
            }
            Ok(false) => {
                let err = StorageError::InvalidData(format!(
                    "intent {} left minting before mint {} was recorded",
                    intent.id, signature
                ));
                self.alert_unrecorded_mint(intent, signature, &err.to_string());
                Err(err.into())
            }
            Err(e) => {
                self.alert_unrecorded_mint(intent, signature, &e.to_string());
                Err(e.into())
            }
        }
    }

    fn alert_unrecorded_mint(&self, intent: &StakeIntent, signature: &str, error: &str) {
        log_operator_alert(
            "mint_not_recorded",
            &intent.id,
            serde_json::json!({
                "user": intent.user,
                "amount": intent.amount_to_mint.to_string(),
                "mint_signature": signature,
                "error": error,
            }),
        );
    }

    fn alert_unrecorded_refund(&self, intent: &StakeIntent, signature: Option<&str>, error: &str) {
        log_operator_alert(
            "refund_not_recorded",
            &intent.id,
            serde_json::json!({
                "user": intent.user,
                "amount": intent.amount_received.to_string(),
                "refund_signature": signature,
                "error": error,
            }),
        );
    }

    async fn compensate(
        &self,
        intent: &StakeIntent,
        recipient: &Pubkey,
        mint_error: LedgerError,
    ) -> Result<ReconcileOutcome, SettlementError> {
        let mint_failure = SettlementError::MintFailure(mint_error.to_string());
        log_stake_event(
            "mint_failed",
            &intent.id,
            &intent.user,
            intent.amount_to_mint,
            None,
            Some(&mint_failure.to_string()),
        );

        if !self
            .store
            .transition(&intent.id, IntentStatus::Minting, IntentStatus::Refunding, None)
            .await?
        {
            return Err(StorageError::InvalidData(format!(
                "intent {} left minting before refund started",
                intent.id
            ))
            .into());
        }

        let lamports = to_base_units(intent.amount_received)?;
        match self.ledger.transfer_base(recipient, lamports).await {
            Ok(signature) => {
                let recorded = self
                    .store
                    .transition(
                        &intent.id,
                        IntentStatus::Refunding,
                        IntentStatus::Refunded,
                        Some(&signature),
                    )
                    .await;

                match recorded {
                    Ok(true) => {}
                    Ok(false) => {
                        let err = StorageError::InvalidData(format!(
                            "intent {} left refunding before refund {} was recorded",
                            intent.id, signature
                        ));
                        self.alert_unrecorded_refund(intent, Some(&signature), &err.to_string());
                        return Err(err.into());
                    }
                    Err(e) => {
                        self.alert_unrecorded_refund(intent, Some(&signature), &e.to_string());
                        return Err(e.into());
                    }
                }

                log_stake_event(
                    "refunded",
                    &intent.id,
                    &intent.user,
                    intent.amount_received,
                    Some(&signature),
                    None,
                );
                Ok(ReconcileOutcome::Refunded {
                    intent_id: intent.id.clone(),
                    signature,
                })
            }
            Err(refund_error) => {
                let diagnostic = format!(
                    "{}; {}",
                    mint_failure,
                    SettlementError::CompensationFailure(refund_error.to_string())
                );
                let recorded = self
                    .store
                    .fail_intent(&intent.id, IntentStatus::Refunding, &diagnostic)
                    .await;

                match recorded {
                    Ok(true) => {}
                    Ok(false) => {
                        let err = StorageError::InvalidData(format!(
                            "intent {} left refunding before refund failure was recorded",
                            intent.id
                        ));
                        self.alert_unrecorded_refund(intent, None, &format!("{}; {}", diagnostic, err));
                        return Err(err.into());
                    }
                    Err(e) => {
                        self.alert_unrecorded_refund(intent, None, &format!("{}; {}", diagnostic, e));
                        return Err(e.into());
                    }
                }

                log_operator_alert(
                    "refund_failed",
                    &intent.id,
                    serde_json::json!({
                        "user": intent.user,
                        "amount": intent.amount_received.to_string(),
                        "error": diagnostic,
                    }),
                );
                Ok(ReconcileOutcome::CompensationFailed {
                    intent_id: intent.id.clone(),
                })
            }
        }
    }
}
