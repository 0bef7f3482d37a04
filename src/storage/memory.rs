//! In-Memory Storage Implementation
//!
//! Provides in-memory storage for testing and development.
//! Data is lost when the service restarts.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{
    IntentLedger, SettlementStore, StorageError, StorageResult, UnstakeLedger, VaultAccumulator,
};
use crate::types::intent::{IntentStatus, StakeIntent};
use crate::types::unstake::{UnstakeIntent, UnstakeStatus};
use crate::types::vault::VaultLedger;

#[derive(Default)]
struct Inner {
    /// Stake intents in insertion order
    intents: Vec<StakeIntent>,
    /// Index: intent ID -> position in `intents`
    intent_index: HashMap<String, usize>,
    /// Unstake intents in insertion order
    unstakes: Vec<UnstakeIntent>,
    /// Index: unstake ID -> position in `unstakes`
    unstake_index: HashMap<String, usize>,
    vault: Option<VaultLedger>,
}

impl Inner {
    fn intent_mut(&mut self, id: &str) -> Option<&mut StakeIntent> {
        let idx = *self.intent_index.get(id)?;
        self.intents.get_mut(idx)
    }

    fn unstake_mut(&mut self, id: &str) -> Option<&mut UnstakeIntent> {
        let idx = *self.unstake_index.get(id)?;
        self.unstakes.get_mut(idx)
    }

    fn vault_mut(&mut self) -> &mut VaultLedger {
        self.vault.get_or_insert_with(VaultLedger::empty)
    }
}

/// In-memory settlement store
///
/// All tables live behind a single lock, so compound operations such as
/// `complete_stake` are atomic with respect to every other call.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

/// Newest first; ties broken by later insertion
fn newest_first<T: Clone>(items: impl DoubleEndedIterator<Item = T>, created_at: fn(&T) -> u64) -> Vec<T> {
    let mut out: Vec<T> = items.rev().collect();
    out.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    out
}

#[async_trait]
impl IntentLedger for MemoryStore {
    async fn insert_intent(&self, intent: &StakeIntent) -> StorageResult<()> {
        let mut inner = self.inner.write().await;

        if inner.intent_index.contains_key(&intent.id) {
            return Err(StorageError::Duplicate(format!("ID: {}", intent.id)));
        }

        let idx = inner.intents.len();
        inner.intent_index.insert(intent.id.clone(), idx);
        inner.intents.push(intent.clone());

        Ok(())
    }

    async fn get_intent(&self, id: &str) -> StorageResult<Option<StakeIntent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .intent_index
            .get(id)
            .and_then(|idx| inner.intents.get(*idx))
            .cloned())
    }

    async fn find_pending_by_user_and_amount(
        &self,
        user: &str,
        amount: Decimal,
    ) -> StorageResult<Option<StakeIntent>> {
        let inner = self.inner.read().await;
        let matches = inner
            .intents
            .iter()
            .filter(|i| i.matches_deposit(user, amount))
            .cloned();

        Ok(newest_first(matches, |i| i.created_at).into_iter().next())
    }

    async fn find_by_deposit_ref(&self, deposit_ref: &str) -> StorageResult<Option<StakeIntent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .intents
            .iter()
            .find(|i| i.deposit_ref.as_deref() == Some(deposit_ref))
            .cloned())
    }

    async fn transition(
        &self,
        id: &str,
        expected: IntentStatus,
        next: IntentStatus,
        settlement_signature: Option<&str>,
    ) -> StorageResult<bool> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let mut inner = self.inner.write().await;

        match inner.intent_mut(id) {
            Some(intent) if intent.status == expected => {
                intent.apply_transition(next, settlement_signature);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn claim_for_minting(&self, id: &str, deposit_ref: Option<&str>) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        if !matches!(inner.intent_mut(id), Some(i) if i.status == IntentStatus::Pending) {
            return Ok(false);
        }
        if let Some(r) = deposit_ref {
            if inner.intents.iter().any(|i| i.deposit_ref.as_deref() == Some(r)) {
                return Err(StorageError::Duplicate(format!("deposit ref: {}", r)));
            }
        }

        match inner.intent_mut(id) {
            Some(intent) if intent.status == IntentStatus::Pending => {
                intent.deposit_ref = deposit_ref.map(str::to_string);
                intent.apply_transition(IntentStatus::Minting, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fail_intent(&self, id: &str, expected: IntentStatus, error: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        match inner.intent_mut(id) {
            Some(intent) if intent.status == expected => {
                intent.error = Some(error.to_string());
                intent.apply_transition(IntentStatus::Failed, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_intents_by_user(&self, user: &str, limit: usize) -> StorageResult<Vec<StakeIntent>> {
        let inner = self.inner.read().await;
        let mine = inner.intents.iter().filter(|i| i.user == user).cloned();

        let mut out = newest_first(mine, |i| i.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn list_intents_by_status(&self, status: IntentStatus) -> StorageResult<Vec<StakeIntent>> {
        let inner = self.inner.read().await;
        let mut out: Vec<StakeIntent> = inner
            .intents
            .iter()
            .filter(|i| i.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|i| i.created_at);
        Ok(out)
    }
}

#[async_trait]
impl VaultAccumulator for MemoryStore {
    async fn get_or_create(&self) -> StorageResult<VaultLedger> {
        let mut inner = self.inner.write().await;
        Ok(inner.vault_mut().clone())
    }

    async fn apply_delta(&self, deposit_delta: Decimal, mint_delta: Decimal) -> StorageResult<VaultLedger> {
        let mut inner = self.inner.write().await;
        let vault = inner.vault_mut();
        vault.apply(deposit_delta, mint_delta);
        Ok(vault.clone())
    }
}

#[async_trait]
impl UnstakeLedger for MemoryStore {
    async fn insert_unstake(&self, intent: &UnstakeIntent) -> StorageResult<()> {
        let mut inner = self.inner.write().await;

        if inner.unstake_index.contains_key(&intent.id) {
            return Err(StorageError::Duplicate(format!("ID: {}", intent.id)));
        }

        let idx = inner.unstakes.len();
        inner.unstake_index.insert(intent.id.clone(), idx);
        inner.unstakes.push(intent.clone());

        Ok(())
    }

    async fn get_unstake(&self, id: &str) -> StorageResult<Option<UnstakeIntent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .unstake_index
            .get(id)
            .and_then(|idx| inner.unstakes.get(*idx))
            .cloned())
    }

    async fn find_unstake_by_message_hash(&self, message_hash: &str) -> StorageResult<Option<UnstakeIntent>> {
        let inner = self.inner.read().await;
        Ok(inner
            .unstakes
            .iter()
            .find(|u| u.message_hash.as_deref() == Some(message_hash))
            .cloned())
    }

    async fn attach_payload(&self, id: &str, message_hash: &str) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        if !matches!(inner.unstake_mut(id), Some(u) if u.status == UnstakeStatus::Initiated) {
            return Ok(false);
        }
        if inner
            .unstakes
            .iter()
            .any(|u| u.message_hash.as_deref() == Some(message_hash))
        {
            return Err(StorageError::Duplicate(format!("message hash: {}", message_hash)));
        }

        match inner.unstake_mut(id) {
            Some(u) if u.status == UnstakeStatus::Initiated => {
                u.message_hash = Some(message_hash.to_string());
                u.status = UnstakeStatus::AwaitingSignature;
                u.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn transition_unstake(
        &self,
        id: &str,
        expected: UnstakeStatus,
        next: UnstakeStatus,
        settlement_signature: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let mut inner = self.inner.write().await;

        match inner.unstake_mut(id) {
            Some(u) if u.status == expected => {
                u.status = next;
                if let Some(sig) = settlement_signature {
                    u.settlement_signature = Some(sig.to_string());
                }
                if let Some(err) = error {
                    u.error = Some(err.to_string());
                }
                u.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_unstakes_by_user(&self, user: &str, limit: usize) -> StorageResult<Vec<UnstakeIntent>> {
        let inner = self.inner.read().await;
        let mine = inner.unstakes.iter().filter(|u| u.user == user).cloned();

        let mut out = newest_first(mine, |u| u.created_at);
        out.truncate(limit);
        Ok(out)
    }

    async fn list_unstakes_by_status(&self, status: UnstakeStatus) -> StorageResult<Vec<UnstakeIntent>> {
        let inner = self.inner.read().await;
        let mut out: Vec<UnstakeIntent> = inner
            .unstakes
            .iter()
            .filter(|u| u.status == status)
            .cloned()
            .collect();
        out.sort_by_key(|u| u.created_at);
        Ok(out)
    }
}

#[async_trait]
impl SettlementStore for MemoryStore {
    async fn complete_stake(&self, id: &str, settlement_signature: &str, amount: Decimal) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        match inner.intent_mut(id) {
            Some(intent) if intent.status == IntentStatus::Minting => {
                intent.apply_transition(IntentStatus::Completed, Some(settlement_signature));
            }
            _ => return Ok(false),
        }

        inner.vault_mut().apply(amount, amount);
        Ok(true)
    }

    async fn settle_unstake(&self, id: &str, settlement_signature: &str, amount: Decimal) -> StorageResult<bool> {
        let mut inner = self.inner.write().await;

        match inner.unstake_mut(id) {
            Some(u) if u.status == UnstakeStatus::Submitted => {
                u.status = UnstakeStatus::Settled;
                u.settlement_signature = Some(settlement_signature.to_string());
                u.touch();
            }
            _ => return Ok(false),
        }

        inner.vault_mut().apply(-amount, -amount);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(user: &str, amount: i64) -> StakeIntent {
        StakeIntent::new(user.into(), "SOL".into(), Decimal::from(amount), "mint".into())
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        let record = intent("alice", 2);

        store.insert_intent(&record).await.unwrap();

        let retrieved = store.get_intent(&record.id).await.unwrap().unwrap();
        assert_eq!(retrieved, record);
        assert!(matches!(
            store.insert_intent(&record).await,
            Err(StorageError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn test_find_pending_prefers_most_recent() {
        let store = MemoryStore::new();
        let mut older = intent("alice", 2);
        older.created_at = 1_000;
        let mut newer = intent("alice", 2);
        newer.created_at = 2_000;

        store.insert_intent(&newer).await.unwrap();
        store.insert_intent(&older).await.unwrap();

        let found = store
            .find_pending_by_user_and_amount("alice", Decimal::from(2))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryStore::new();
        let record = intent("alice", 2);
        store.insert_intent(&record).await.unwrap();

        assert!(store.claim_for_minting(&record.id, Some("sig:0")).await.unwrap());
        assert!(!store.claim_for_minting(&record.id, Some("sig:1")).await.unwrap());

        let other = intent("bob", 1);
        store.insert_intent(&other).await.unwrap();
        assert!(matches!(
            store.claim_for_minting(&other.id, Some("sig:0")).await,
            Err(StorageError::Duplicate(_))
        ));

        let found = store.find_by_deposit_ref("sig:0").await.unwrap().unwrap();
        assert_eq!(found.id, record.id);
        assert_eq!(found.status, IntentStatus::Minting);
    }

    #[tokio::test]
    async fn test_transition_off_the_saga_never_applies() {
        let store = MemoryStore::new();
        let record = intent("alice", 2);
        store.insert_intent(&record).await.unwrap();

        assert!(!store
            .transition(&record.id, IntentStatus::Pending, IntentStatus::Completed, Some("mintsig"))
            .await
            .unwrap());
        let unchanged = store.get_intent(&record.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, IntentStatus::Pending);
        assert!(unchanged.settlement_signature.is_none());

        assert!(store.claim_for_minting(&record.id, Some("sig:0")).await.unwrap());
        assert!(!store
            .transition(&record.id, IntentStatus::Minting, IntentStatus::Pending, None)
            .await
            .unwrap());
        assert!(store.complete_stake(&record.id, "mintsig", Decimal::from(2)).await.unwrap());
        assert!(!store
            .transition(&record.id, IntentStatus::Completed, IntentStatus::Refunding, None)
            .await
            .unwrap());
        assert_eq!(
            store.get_intent(&record.id).await.unwrap().unwrap().status,
            IntentStatus::Completed
        );

        let u = UnstakeIntent::new("alice".into(), Decimal::from(1));
        store.insert_unstake(&u).await.unwrap();
        assert!(!store
            .transition_unstake(&u.id, UnstakeStatus::Initiated, UnstakeStatus::Settled, Some("sig"), None)
            .await
            .unwrap());
        let unstake = store.get_unstake(&u.id).await.unwrap().unwrap();
        assert_eq!(unstake.status, UnstakeStatus::Initiated);
        assert!(unstake.settlement_signature.is_none());
    }

    #[tokio::test]
    async fn test_complete_stake_credits_once() {
        let store = MemoryStore::new();
        let record = intent("alice", 2);
        store.insert_intent(&record).await.unwrap();
        store.claim_for_minting(&record.id, None).await.unwrap();

        assert!(store.complete_stake(&record.id, "mintsig", Decimal::from(2)).await.unwrap());
        assert!(!store.complete_stake(&record.id, "mintsig", Decimal::from(2)).await.unwrap());

        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, Decimal::from(2));
        assert_eq!(vault.total_minted, Decimal::from(2));
        assert_eq!(vault.version, 1);
        assert!(vault.is_pegged());
    }

    #[tokio::test]
    async fn test_settle_unstake_debits_once() {
        let store = MemoryStore::new();
        store.apply_delta(Decimal::from(5), Decimal::from(5)).await.unwrap();

        let u = UnstakeIntent::new("alice".into(), Decimal::from(2));
        store.insert_unstake(&u).await.unwrap();
        assert!(store.attach_payload(&u.id, "hash").await.unwrap());
        assert!(store
            .transition_unstake(&u.id, UnstakeStatus::AwaitingSignature, UnstakeStatus::Submitted, None, None)
            .await
            .unwrap());

        assert!(store.settle_unstake(&u.id, "sig", Decimal::from(2)).await.unwrap());
        assert!(!store.settle_unstake(&u.id, "sig", Decimal::from(2)).await.unwrap());

        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, Decimal::from(3));
        assert_eq!(vault.total_minted, Decimal::from(3));

        let found = store.find_unstake_by_message_hash("hash").await.unwrap().unwrap();
        assert_eq!(found.status, UnstakeStatus::Settled);
        assert_eq!(found.settlement_signature.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn test_concurrent_deltas_all_apply() {
        let store = MemoryStore::new();

        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.apply_delta(Decimal::ONE, Decimal::ONE).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, Decimal::from(50));
        assert_eq!(vault.version, 50);
    }
}
