//! Stake intake: validate a stake request and record a pending intent.

use rust_decimal::Decimal;

use super::{SettlementEngine, SettlementError};
use crate::logging::log_stake_event;
use crate::storage::IntentLedger;
use crate::types::intent::StakeIntent;

impl SettlementEngine {
    /// Record a pending stake intent and return its ID
    ///
    /// The ID is the correlation token the client may attach as a memo to
    /// its deposit.
    pub async fn create_intent(&self, user: &str, amount: Decimal) -> Result<String, SettlementError> {
        let user = self.validate_user(user)?;
        self.validate_amount(amount)?;

        let intent = StakeIntent::new(
            user.to_string(),
            self.settings.base_asset.clone(),
            amount.normalize(),
            self.settings.derivative_mint.to_string(),
        );
        self.store.insert_intent(&intent).await?;

        log_stake_event(
            "intent_created",
            &intent.id,
            &intent.user,
            intent.amount_received,
            None,
            None,
        );

        Ok(intent.id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::sol_client::MockSettlementLedger;
    use crate::storage::IntentLedger;
    use crate::types::intent::IntentStatus;

    #[tokio::test]
    async fn test_create_intent_records_pending() {
        let (engine, store) = engine(MockSettlementLedger::new());
        let user = wallet();

        let id = engine.create_intent(&user, dec("2.0")).await.unwrap();

        let intent = store.get_intent(&id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.user, user);
        assert_eq!(intent.amount_received, dec("2"));
        assert_eq!(intent.amount_to_mint, intent.amount_received);
        assert_eq!(intent.asset_received, "SOL");
        assert_eq!(intent.derivative_asset, engine.settings().derivative_mint.to_string());
    }

    #[tokio::test]
    async fn test_create_intent_rejects_bad_input() {
        let (engine, store) = engine(MockSettlementLedger::new());

        assert!(matches!(
            engine.create_intent("bogus", dec("1")).await,
            Err(SettlementError::Validation(_))
        ));
        assert!(matches!(
            engine.create_intent(&wallet(), Decimal::ZERO).await,
            Err(SettlementError::Validation(_))
        ));

        let user = wallet();
        assert!(engine.create_intent(&user, dec("-3")).await.is_err());
        assert!(store.list_intents_by_user(&user, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_each_call_creates_distinct_intent() {
        let (engine, _) = engine(MockSettlementLedger::new());
        let user = wallet();

        let a = engine.create_intent(&user, dec("1")).await.unwrap();
        let b = engine.create_intent(&user, dec("1")).await.unwrap();
        assert_ne!(a, b);
    }
}
