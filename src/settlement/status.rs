//! Read-only projections over intents and the vault ledger.

use super::{SettlementEngine, SettlementError};
use crate::storage::{IntentLedger, UnstakeLedger, VaultAccumulator};
use crate::types::api::{IntentSummary, UnresolvedReport, VaultSummary};
use crate::types::intent::IntentStatus;
use crate::types::units::from_base_units;
use crate::types::unstake::UnstakeStatus;

impl SettlementEngine {
    /// Status string of a stake or unstake intent
    pub async fn get_status(&self, id: &str) -> Result<String, SettlementError> {
        if let Some(intent) = self.store.get_intent(id).await? {
            return Ok(intent.status.to_string());
        }
        if let Some(unstake) = self.store.get_unstake(id).await? {
            return Ok(unstake.status.to_string());
        }
        Err(SettlementError::NotFound(id.to_string()))
    }

    /// A user's stake and unstake intents, newest first
    pub async fn list_recent_by_user(
        &self,
        user: &str,
        limit: Option<usize>,
    ) -> Result<Vec<IntentSummary>, SettlementError> {
        let user = self.validate_user(user)?.to_string();
        let limit = self.settings.page_size(limit);

        let stakes = self.store.list_intents_by_user(&user, limit).await?;
        let unstakes = self.store.list_unstakes_by_user(&user, limit).await?;

        let mut summaries: Vec<IntentSummary> = stakes
            .iter()
            .map(IntentSummary::from)
            .chain(unstakes.iter().map(IntentSummary::from))
            .collect();
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        summaries.truncate(limit);

        Ok(summaries)
    }

    /// Vault totals, plus the authority's on-chain balance when reachable
    pub async fn vault_summary(&self) -> Result<VaultSummary, SettlementError> {
        let vault = self.store.get_or_create().await?;

        let authority = self.ledger.authority();
        let authority_balance = match self.ledger.balance(&authority).await {
            Ok(lamports) => Some(from_base_units(lamports)),
            Err(e) => {
                tracing::warn!(target: "stakevault::ledger", authority = %authority, error = %e, "Authority balance unavailable");
                None
            }
        };

        Ok(VaultSummary {
            total_deposited: vault.total_deposited,
            total_minted: vault.total_minted,
            pegged: vault.is_pegged(),
            version: vault.version,
            authority_balance,
        })
    }

    /// Intents that need an operator: failed refunds, stuck sagas, unsettled unstakes
    pub async fn unresolved(&self) -> Result<UnresolvedReport, SettlementError> {
        let mut report = UnresolvedReport::default();

        for intent in self.store.list_intents_by_status(IntentStatus::Failed).await? {
            report.failed_stakes.push(IntentSummary::from(&intent));
        }
        for status in [IntentStatus::Minting, IntentStatus::Refunding] {
            for intent in self.store.list_intents_by_status(status).await? {
                report.in_flight_stakes.push(IntentSummary::from(&intent));
            }
        }
        for status in [UnstakeStatus::Submitted, UnstakeStatus::Failed] {
            for unstake in self.store.list_unstakes_by_status(status).await? {
                report.unstakes.push(IntentSummary::from(&unstake));
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::sol_client::{LedgerError, MockSettlementLedger};
    use crate::types::api::IntentKind;
    use crate::types::unstake::UnstakeIntent;
    use solana_sdk::pubkey::Pubkey;

    #[tokio::test]
    async fn test_status_of_stake_and_unstake() {
        let (engine, store) = engine(MockSettlementLedger::new());
        let user = wallet();

        let stake_id = engine.create_intent(&user, dec("1")).await.unwrap();
        assert_eq!(engine.get_status(&stake_id).await.unwrap(), "pending");

        let unstake = UnstakeIntent::new(user.clone(), dec("1"));
        store.insert_unstake(&unstake).await.unwrap();
        assert_eq!(engine.get_status(&unstake.id).await.unwrap(), "initiated");

        assert!(matches!(
            engine.get_status("missing").await,
            Err(SettlementError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_merges_newest_first() {
        let (engine, store) = engine(MockSettlementLedger::new());
        let user = wallet();

        let first = engine.create_intent(&user, dec("1")).await.unwrap();
        let mut unstake = UnstakeIntent::new(user.clone(), dec("0.5"));
        unstake.created_at += 10;
        store.insert_unstake(&unstake).await.unwrap();

        let history = engine.list_recent_by_user(&user, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, unstake.id);
        assert_eq!(history[0].kind, IntentKind::Unstake);
        assert_eq!(history[1].id, first);

        let one = engine.list_recent_by_user(&user, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);

        assert!(engine.list_recent_by_user(&wallet(), None).await.unwrap().is_empty());
        assert!(engine.list_recent_by_user("nope", None).await.is_err());
    }

    #[tokio::test]
    async fn test_vault_summary_tolerates_ledger_outage() {
        let mut ledger = MockSettlementLedger::new();
        ledger.expect_authority().return_const(Pubkey::new_unique());
        ledger
            .expect_balance()
            .returning(|_| Err(LedgerError::Rpc("connection refused".into())));

        let (engine, store) = engine(ledger);
        store.apply_delta(dec("3"), dec("3")).await.unwrap();

        let summary = engine.vault_summary().await.unwrap();
        assert_eq!(summary.total_deposited, dec("3"));
        assert!(summary.pegged);
        assert_eq!(summary.version, 1);
        assert!(summary.authority_balance.is_none());
    }

    #[tokio::test]
    async fn test_vault_summary_reports_authority_balance() {
        let authority = Pubkey::new_unique();
        let mut ledger = MockSettlementLedger::new();
        ledger.expect_authority().return_const(authority);
        ledger
            .expect_balance()
            .withf(move |owner| *owner == authority)
            .times(1)
            .returning(|_| Ok(4_500_000_000));

        let (engine, _) = engine(ledger);
        let summary = engine.vault_summary().await.unwrap();
        assert_eq!(summary.authority_balance, Some(dec("4.5")));
    }

    #[tokio::test]
    async fn test_unresolved_lists_stuck_work() {
        let (engine, store) = engine(MockSettlementLedger::new());
        let user = wallet();

        assert!(engine.unresolved().await.unwrap().is_empty());

        let stuck = engine.create_intent(&user, dec("1")).await.unwrap();
        store.claim_for_minting(&stuck, Some("sig:0")).await.unwrap();

        let failed = engine.create_intent(&user, dec("2")).await.unwrap();
        store.claim_for_minting(&failed, Some("sig:1")).await.unwrap();
        store
            .transition(&failed, IntentStatus::Minting, IntentStatus::Refunding, None)
            .await
            .unwrap();
        store
            .fail_intent(&failed, IntentStatus::Refunding, "refund failed")
            .await
            .unwrap();

        let unstake = UnstakeIntent::new(user.clone(), dec("1"));
        store.insert_unstake(&unstake).await.unwrap();
        store
            .transition_unstake(
                &unstake.id,
                UnstakeStatus::Initiated,
                UnstakeStatus::Failed,
                None,
                Some("blockhash unavailable"),
            )
            .await
            .unwrap();

        let report = engine.unresolved().await.unwrap();
        assert_eq!(report.failed_stakes.len(), 1);
        assert_eq!(report.failed_stakes[0].id, failed);
        assert_eq!(report.in_flight_stakes.len(), 1);
        assert_eq!(report.in_flight_stakes[0].id, stuck);
        assert_eq!(report.unstakes.len(), 1);
    }
}
