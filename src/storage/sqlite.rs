//! SQLite Persistent Storage for the Settlement Engine
//!
//! Provides durable storage for intents and the vault ledger that survives
//! service restarts. Uses connection pooling via r2d2 for concurrent access.
//!
//! Amounts are stored as integer lamports so equality matching and the
//! `total = total + ?` increments are exact.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;
use std::path::Path;
use std::time::Duration;

use super::traits::{
    IntentLedger, SettlementStore, StorageError, StorageResult, UnstakeLedger, VaultAccumulator,
};
use crate::types::intent::{now_millis, IntentStatus, StakeIntent};
use crate::types::units::{from_signed_base_units, to_signed_base_units};
use crate::types::unstake::{UnstakeIntent, UnstakeStatus};
use crate::types::vault::{VaultLedger, VAULT_LEDGER_ID};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed settlement store with connection pooling
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

/// Map a UNIQUE/PRIMARY KEY violation to `Duplicate`
fn unique_err(e: rusqlite::Error, what: &str) -> StorageError {
    if let rusqlite::Error::SqliteFailure(ref err, _) = e {
        if err.extended_code == 1555 || err.extended_code == 2067 {
            return StorageError::Duplicate(what.to_string());
        }
    }
    db_err(e)
}

fn lamports(amount: Decimal) -> StorageResult<i64> {
    to_signed_base_units(amount).map_err(|e| StorageError::InvalidData(format!("{}: {}", amount, e)))
}

fn parse_status<T: std::str::FromStr<Err = String>>(row: &rusqlite::Row, idx: &str) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into()))
}

impl SqliteStore {
    /// Create a new store with the given database path
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|c| c.busy_timeout(BUSY_TIMEOUT));
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stake_intents (
                id TEXT PRIMARY KEY,
                user_wallet TEXT NOT NULL,
                asset_received TEXT NOT NULL,
                amount_received INTEGER NOT NULL,
                derivative_asset TEXT NOT NULL,
                amount_to_mint INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                settlement_signature TEXT,
                deposit_ref TEXT UNIQUE,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stake_intents_match
                ON stake_intents(user_wallet, amount_received, status);
            CREATE INDEX IF NOT EXISTS idx_stake_intents_status ON stake_intents(status);

            CREATE TABLE IF NOT EXISTS unstake_intents (
                id TEXT PRIMARY KEY,
                user_wallet TEXT NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'initiated',
                message_hash TEXT UNIQUE,
                settlement_signature TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_unstake_intents_user ON unstake_intents(user_wallet);
            CREATE INDEX IF NOT EXISTS idx_unstake_intents_status ON unstake_intents(status);

            CREATE TABLE IF NOT EXISTS vault_ledger (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                total_deposited INTEGER NOT NULL DEFAULT 0,
                total_minted INTEGER NOT NULL DEFAULT 0,
                version INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    /// Convert a database row to StakeIntent
    fn row_to_intent(row: &rusqlite::Row) -> rusqlite::Result<StakeIntent> {
        Ok(StakeIntent {
            id: row.get("id")?,
            user: row.get("user_wallet")?,
            asset_received: row.get("asset_received")?,
            amount_received: from_signed_base_units(row.get("amount_received")?),
            derivative_asset: row.get("derivative_asset")?,
            amount_to_mint: from_signed_base_units(row.get("amount_to_mint")?),
            status: parse_status(row, "status")?,
            settlement_signature: row.get("settlement_signature")?,
            deposit_ref: row.get("deposit_ref")?,
            error: row.get("error")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    /// Convert a database row to UnstakeIntent
    fn row_to_unstake(row: &rusqlite::Row) -> rusqlite::Result<UnstakeIntent> {
        Ok(UnstakeIntent {
            id: row.get("id")?,
            user: row.get("user_wallet")?,
            amount: from_signed_base_units(row.get("amount")?),
            status: parse_status(row, "status")?,
            message_hash: row.get("message_hash")?,
            settlement_signature: row.get("settlement_signature")?,
            error: row.get("error")?,
            created_at: row.get::<_, i64>("created_at")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    fn row_to_vault(row: &rusqlite::Row) -> rusqlite::Result<VaultLedger> {
        Ok(VaultLedger {
            id: row.get("id")?,
            total_deposited: from_signed_base_units(row.get("total_deposited")?),
            total_minted: from_signed_base_units(row.get("total_minted")?),
            version: row.get::<_, i64>("version")? as u64,
            updated_at: row.get::<_, i64>("updated_at")? as u64,
        })
    }

    // Vault helpers shared by the standalone and compound operations

    fn ensure_vault(conn: &rusqlite::Connection) -> Result<(), StorageError> {
        conn.execute(
            "INSERT OR IGNORE INTO vault_ledger (id, updated_at) VALUES (?1, ?2)",
            params![VAULT_LEDGER_ID, now_millis() as i64],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn read_vault(conn: &rusqlite::Connection) -> Result<VaultLedger, StorageError> {
        conn.query_row(
            "SELECT * FROM vault_ledger WHERE id = ?1",
            params![VAULT_LEDGER_ID],
            |row| Self::row_to_vault(row),
        )
        .map_err(db_err)
    }

    fn add_to_vault(
        conn: &rusqlite::Connection,
        deposit_delta: Decimal,
        mint_delta: Decimal,
    ) -> Result<(), StorageError> {
        Self::ensure_vault(conn)?;
        conn.execute(
            r#"
            UPDATE vault_ledger SET
                total_deposited = total_deposited + ?2,
                total_minted = total_minted + ?3,
                version = version + 1,
                updated_at = ?4
            WHERE id = ?1
            "#,
            params![
                VAULT_LEDGER_ID,
                lamports(deposit_delta)?,
                lamports(mint_delta)?,
                now_millis() as i64,
            ],
        )
        .map_err(db_err)?;
        Ok(())
    }

    // Synchronous helper methods for the trait implementations

    fn insert_intent_sync(&self, intent: &StakeIntent) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO stake_intents (
                id, user_wallet, asset_received, amount_received, derivative_asset,
                amount_to_mint, status, settlement_signature, deposit_ref, error,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                intent.id,
                intent.user,
                intent.asset_received,
                lamports(intent.amount_received)?,
                intent.derivative_asset,
                lamports(intent.amount_to_mint)?,
                intent.status.to_string(),
                intent.settlement_signature,
                intent.deposit_ref,
                intent.error,
                intent.created_at as i64,
                intent.updated_at as i64,
            ],
        )
        .map_err(|e| unique_err(e, &intent.id))?;

        Ok(())
    }

    fn query_intent(&self, sql: &str, param: &str) -> Result<Option<StakeIntent>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(sql, params![param], |row| Self::row_to_intent(row))
            .optional()
            .map_err(db_err)
    }

    fn find_pending_sync(&self, user: &str, amount: Decimal) -> Result<Option<StakeIntent>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(
            r#"
            SELECT * FROM stake_intents
            WHERE user_wallet = ?1 AND amount_received = ?2 AND status = 'pending'
            ORDER BY created_at DESC, rowid DESC
            LIMIT 1
            "#,
            params![user, lamports(amount)?],
            |row| Self::row_to_intent(row),
        )
        .optional()
        .map_err(db_err)
    }

    fn transition_sync(
        &self,
        id: &str,
        expected: IntentStatus,
        next: IntentStatus,
        settlement_signature: Option<&str>,
    ) -> Result<bool, StorageError> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE stake_intents SET
                status = ?3,
                settlement_signature = COALESCE(?4, settlement_signature),
                updated_at = ?5
            WHERE id = ?1 AND status = ?2
            "#,
                params![
                    id,
                    expected.to_string(),
                    next.to_string(),
                    settlement_signature,
                    now_millis() as i64,
                ],
            )
            .map_err(db_err)?;

        Ok(rows_affected == 1)
    }

    fn claim_sync(&self, id: &str, deposit_ref: Option<&str>) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE stake_intents SET
                status = 'minting',
                deposit_ref = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
                params![id, deposit_ref, now_millis() as i64],
            )
            .map_err(|e| unique_err(e, &format!("deposit ref: {}", deposit_ref.unwrap_or_default())))?;

        Ok(rows_affected == 1)
    }

    fn fail_intent_sync(&self, id: &str, expected: IntentStatus, error: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE stake_intents SET status = 'failed', error = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2
            "#,
                params![id, expected.to_string(), error, now_millis() as i64],
            )
            .map_err(db_err)?;

        Ok(rows_affected == 1)
    }

    fn list_intents_sync(&self, sql: &str, param: &str, limit: i64) -> Result<Vec<StakeIntent>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(sql).map_err(db_err)?;

        let records = stmt
            .query_map(params![param, limit], |row| Self::row_to_intent(row))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }

    fn get_or_create_sync(&self) -> Result<VaultLedger, StorageError> {
        let conn = self.conn()?;
        Self::ensure_vault(&conn)?;
        Self::read_vault(&conn)
    }

    fn apply_delta_sync(&self, deposit_delta: Decimal, mint_delta: Decimal) -> Result<VaultLedger, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        Self::add_to_vault(&tx, deposit_delta, mint_delta)?;
        let vault = Self::read_vault(&tx)?;

        tx.commit().map_err(db_err)?;
        Ok(vault)
    }

    fn insert_unstake_sync(&self, intent: &UnstakeIntent) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO unstake_intents (
                id, user_wallet, amount, status, message_hash,
                settlement_signature, error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                intent.id,
                intent.user,
                lamports(intent.amount)?,
                intent.status.to_string(),
                intent.message_hash,
                intent.settlement_signature,
                intent.error,
                intent.created_at as i64,
                intent.updated_at as i64,
            ],
        )
        .map_err(|e| unique_err(e, &intent.id))?;

        Ok(())
    }

    fn query_unstake(&self, sql: &str, param: &str) -> Result<Option<UnstakeIntent>, StorageError> {
        let conn = self.conn()?;

        conn.query_row(sql, params![param], |row| Self::row_to_unstake(row))
            .optional()
            .map_err(db_err)
    }

    fn attach_payload_sync(&self, id: &str, message_hash: &str) -> Result<bool, StorageError> {
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE unstake_intents SET
                status = 'awaiting_signature',
                message_hash = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'initiated'
            "#,
                params![id, message_hash, now_millis() as i64],
            )
            .map_err(|e| unique_err(e, &format!("message hash: {}", message_hash)))?;

        Ok(rows_affected == 1)
    }

    fn transition_unstake_sync(
        &self,
        id: &str,
        expected: UnstakeStatus,
        next: UnstakeStatus,
        settlement_signature: Option<&str>,
        error: Option<&str>,
    ) -> Result<bool, StorageError> {
        if !expected.can_transition_to(next) {
            return Ok(false);
        }
        let conn = self.conn()?;

        let rows_affected = conn
            .execute(
                r#"
            UPDATE unstake_intents SET
                status = ?3,
                settlement_signature = COALESCE(?4, settlement_signature),
                error = COALESCE(?5, error),
                updated_at = ?6
            WHERE id = ?1 AND status = ?2
            "#,
                params![
                    id,
                    expected.to_string(),
                    next.to_string(),
                    settlement_signature,
                    error,
                    now_millis() as i64,
                ],
            )
            .map_err(db_err)?;

        Ok(rows_affected == 1)
    }

    fn list_unstakes_sync(&self, sql: &str, param: &str, limit: i64) -> Result<Vec<UnstakeIntent>, StorageError> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(sql).map_err(db_err)?;

        let records = stmt
            .query_map(params![param, limit], |row| Self::row_to_unstake(row))
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(records)
    }

    fn complete_stake_sync(&self, id: &str, settlement_signature: &str, amount: Decimal) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let rows_affected = tx
            .execute(
                r#"
            UPDATE stake_intents SET
                status = 'completed',
                settlement_signature = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'minting'
            "#,
                params![id, settlement_signature, now_millis() as i64],
            )
            .map_err(db_err)?;

        if rows_affected != 1 {
            // Dropping the transaction rolls back
            return Ok(false);
        }

        Self::add_to_vault(&tx, amount, amount)?;
        tx.commit().map_err(db_err)?;

        Ok(true)
    }

    fn settle_unstake_sync(&self, id: &str, settlement_signature: &str, amount: Decimal) -> Result<bool, StorageError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let rows_affected = tx
            .execute(
                r#"
            UPDATE unstake_intents SET
                status = 'settled',
                settlement_signature = ?2,
                updated_at = ?3
            WHERE id = ?1 AND status = 'submitted'
            "#,
                params![id, settlement_signature, now_millis() as i64],
            )
            .map_err(db_err)?;

        if rows_affected != 1 {
            return Ok(false);
        }

        Self::add_to_vault(&tx, -amount, -amount)?;
        tx.commit().map_err(db_err)?;

        Ok(true)
    }
}

/// Negative LIMIT means no limit in SQLite
const NO_LIMIT: i64 = -1;

#[async_trait]
impl IntentLedger for SqliteStore {
    async fn insert_intent(&self, intent: &StakeIntent) -> StorageResult<()> {
        self.insert_intent_sync(intent)
    }

    async fn get_intent(&self, id: &str) -> StorageResult<Option<StakeIntent>> {
        self.query_intent("SELECT * FROM stake_intents WHERE id = ?1", id)
    }

    async fn find_pending_by_user_and_amount(
        &self,
        user: &str,
        amount: Decimal,
    ) -> StorageResult<Option<StakeIntent>> {
        self.find_pending_sync(user, amount)
    }

    async fn find_by_deposit_ref(&self, deposit_ref: &str) -> StorageResult<Option<StakeIntent>> {
        self.query_intent("SELECT * FROM stake_intents WHERE deposit_ref = ?1", deposit_ref)
    }

    async fn transition(
        &self,
        id: &str,
        expected: IntentStatus,
        next: IntentStatus,
        settlement_signature: Option<&str>,
    ) -> StorageResult<bool> {
        self.transition_sync(id, expected, next, settlement_signature)
    }

    async fn claim_for_minting(&self, id: &str, deposit_ref: Option<&str>) -> StorageResult<bool> {
        self.claim_sync(id, deposit_ref)
    }

    async fn fail_intent(&self, id: &str, expected: IntentStatus, error: &str) -> StorageResult<bool> {
        self.fail_intent_sync(id, expected, error)
    }

    async fn list_intents_by_user(&self, user: &str, limit: usize) -> StorageResult<Vec<StakeIntent>> {
        self.list_intents_sync(
            "SELECT * FROM stake_intents WHERE user_wallet = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            user,
            limit.min(i64::MAX as usize) as i64,
        )
    }

    async fn list_intents_by_status(&self, status: IntentStatus) -> StorageResult<Vec<StakeIntent>> {
        self.list_intents_sync(
            "SELECT * FROM stake_intents WHERE status = ?1 ORDER BY created_at ASC, rowid ASC LIMIT ?2",
            &status.to_string(),
            NO_LIMIT,
        )
    }
}

#[async_trait]
impl VaultAccumulator for SqliteStore {
    async fn get_or_create(&self) -> StorageResult<VaultLedger> {
        self.get_or_create_sync()
    }

    async fn apply_delta(&self, deposit_delta: Decimal, mint_delta: Decimal) -> StorageResult<VaultLedger> {
        self.apply_delta_sync(deposit_delta, mint_delta)
    }
}

#[async_trait]
impl UnstakeLedger for SqliteStore {
    async fn insert_unstake(&self, intent: &UnstakeIntent) -> StorageResult<()> {
        self.insert_unstake_sync(intent)
    }

    async fn get_unstake(&self, id: &str) -> StorageResult<Option<UnstakeIntent>> {
        self.query_unstake("SELECT * FROM unstake_intents WHERE id = ?1", id)
    }

    async fn find_unstake_by_message_hash(&self, message_hash: &str) -> StorageResult<Option<UnstakeIntent>> {
        self.query_unstake("SELECT * FROM unstake_intents WHERE message_hash = ?1", message_hash)
    }

    async fn attach_payload(&self, id: &str, message_hash: &str) -> StorageResult<bool> {
        self.attach_payload_sync(id, message_hash)
    }

    async fn transition_unstake(
        &self,
        id: &str,
        expected: UnstakeStatus,
        next: UnstakeStatus,
        settlement_signature: Option<&str>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        self.transition_unstake_sync(id, expected, next, settlement_signature, error)
    }

    async fn list_unstakes_by_user(&self, user: &str, limit: usize) -> StorageResult<Vec<UnstakeIntent>> {
        self.list_unstakes_sync(
            "SELECT * FROM unstake_intents WHERE user_wallet = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
            user,
            limit.min(i64::MAX as usize) as i64,
        )
    }

    async fn list_unstakes_by_status(&self, status: UnstakeStatus) -> StorageResult<Vec<UnstakeIntent>> {
        self.list_unstakes_sync(
            "SELECT * FROM unstake_intents WHERE status = ?1 ORDER BY created_at ASC, rowid ASC LIMIT ?2",
            &status.to_string(),
            NO_LIMIT,
        )
    }
}

#[async_trait]
impl SettlementStore for SqliteStore {
    async fn complete_stake(&self, id: &str, settlement_signature: &str, amount: Decimal) -> StorageResult<bool> {
        self.complete_stake_sync(id, settlement_signature, amount)
    }

    async fn settle_unstake(&self, id: &str, settlement_signature: &str, amount: Decimal) -> StorageResult<bool> {
        self.settle_unstake_sync(id, settlement_signature, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn create_test_intent(id: &str, user: &str, amount: &str) -> StakeIntent {
        let mut intent = StakeIntent::new(user.to_string(), "SOL".into(), dec(amount), "mint".into());
        intent.id = id.to_string();
        intent
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteStore::in_memory().unwrap();
        let intent = create_test_intent("test1", "alice", "1.5");

        store.insert_intent(&intent).await.unwrap();

        let retrieved = store.get_intent("test1").await.unwrap().unwrap();
        assert_eq!(retrieved, intent);
        assert_eq!(retrieved.amount_received, dec("1.5"));
        assert!(store.get_intent("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_id() {
        let store = SqliteStore::in_memory().unwrap();
        let intent = create_test_intent("test1", "alice", "1");

        store.insert_intent(&intent).await.unwrap();
        let result = store.insert_intent(&intent).await;

        assert!(matches!(result, Err(StorageError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_find_pending_most_recent() {
        let store = SqliteStore::in_memory().unwrap();

        let mut older = create_test_intent("older", "alice", "2");
        older.created_at = 1_000;
        let mut newer = create_test_intent("newer", "alice", "2.0");
        newer.created_at = 2_000;
        let other_amount = create_test_intent("other", "alice", "3");

        store.insert_intent(&newer).await.unwrap();
        store.insert_intent(&older).await.unwrap();
        store.insert_intent(&other_amount).await.unwrap();

        let found = store
            .find_pending_by_user_and_amount("alice", dec("2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "newer");

        assert!(store
            .find_pending_by_user_and_amount("bob", dec("2"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_conditional_transitions() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_intent(&create_test_intent("t1", "alice", "1")).await.unwrap();

        assert!(store.claim_for_minting("t1", Some("sig:0")).await.unwrap());
        assert!(!store.claim_for_minting("t1", Some("sig:0")).await.unwrap());

        assert!(!store
            .transition("t1", IntentStatus::Pending, IntentStatus::Minting, None)
            .await
            .unwrap());
        assert!(store
            .transition("t1", IntentStatus::Minting, IntentStatus::Refunding, None)
            .await
            .unwrap());
        assert!(store.fail_intent("t1", IntentStatus::Refunding, "rpc down").await.unwrap());

        let failed = store.get_intent("t1").await.unwrap().unwrap();
        assert_eq!(failed.status, IntentStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("rpc down"));
        assert_eq!(failed.deposit_ref.as_deref(), Some("sig:0"));

        let listed = store.list_intents_by_status(IntentStatus::Failed).await.unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[tokio::test]
    async fn test_transition_off_the_saga_never_applies() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_intent(&create_test_intent("t1", "alice", "1")).await.unwrap();

        assert!(!store
            .transition("t1", IntentStatus::Pending, IntentStatus::Refunded, Some("refundsig"))
            .await
            .unwrap());
        let unchanged = store.get_intent("t1").await.unwrap().unwrap();
        assert_eq!(unchanged.status, IntentStatus::Pending);
        assert!(unchanged.settlement_signature.is_none());

        let u = UnstakeIntent::new("alice".into(), dec("1"));
        store.insert_unstake(&u).await.unwrap();
        assert!(!store
            .transition_unstake(&u.id, UnstakeStatus::Initiated, UnstakeStatus::Submitted, None, None)
            .await
            .unwrap());
        assert_eq!(
            store.get_unstake(&u.id).await.unwrap().unwrap().status,
            UnstakeStatus::Initiated
        );
    }

    #[tokio::test]
    async fn test_deposit_ref_unique() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_intent(&create_test_intent("a", "alice", "1")).await.unwrap();
        store.insert_intent(&create_test_intent("b", "alice", "1")).await.unwrap();

        assert!(store.claim_for_minting("a", Some("sig:0")).await.unwrap());
        let result = store.claim_for_minting("b", Some("sig:0")).await;
        assert!(matches!(result, Err(StorageError::Duplicate(_))));

        let b = store.get_intent("b").await.unwrap().unwrap();
        assert_eq!(b.status, IntentStatus::Pending);

        let by_ref = store.find_by_deposit_ref("sig:0").await.unwrap().unwrap();
        assert_eq!(by_ref.id, "a");
    }

    #[tokio::test]
    async fn test_complete_stake_is_atomic_and_once() {
        let store = SqliteStore::in_memory().unwrap();
        store.insert_intent(&create_test_intent("t1", "alice", "2")).await.unwrap();

        // Not minting yet: nothing credited
        assert!(!store.complete_stake("t1", "mintsig", dec("2")).await.unwrap());
        assert_eq!(store.get_or_create().await.unwrap().version, 0);

        store.claim_for_minting("t1", None).await.unwrap();
        assert!(store.complete_stake("t1", "mintsig", dec("2")).await.unwrap());
        assert!(!store.complete_stake("t1", "mintsig", dec("2")).await.unwrap());

        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, dec("2"));
        assert_eq!(vault.total_minted, dec("2"));
        assert_eq!(vault.version, 1);
        assert!(vault.is_pegged());

        let intent = store.get_intent("t1").await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Completed);
        assert_eq!(intent.settlement_signature.as_deref(), Some("mintsig"));
    }

    #[tokio::test]
    async fn test_unstake_lifecycle() {
        let store = SqliteStore::in_memory().unwrap();
        store.apply_delta(dec("5"), dec("5")).await.unwrap();

        let u = UnstakeIntent::new("alice".into(), dec("1.25"));
        store.insert_unstake(&u).await.unwrap();

        assert!(store.attach_payload(&u.id, "abc123").await.unwrap());
        assert!(!store.attach_payload(&u.id, "abc123").await.unwrap());
        assert!(store
            .transition_unstake(&u.id, UnstakeStatus::AwaitingSignature, UnstakeStatus::Submitted, None, None)
            .await
            .unwrap());

        assert!(store.settle_unstake(&u.id, "burnsig", dec("1.25")).await.unwrap());
        assert!(!store.settle_unstake(&u.id, "burnsig", dec("1.25")).await.unwrap());

        let found = store.find_unstake_by_message_hash("abc123").await.unwrap().unwrap();
        assert_eq!(found.status, UnstakeStatus::Settled);
        assert_eq!(found.settlement_signature.as_deref(), Some("burnsig"));

        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, dec("3.75"));
        assert_eq!(vault.total_minted, dec("3.75"));
        assert_eq!(vault.version, 2);

        let history = store.list_unstakes_by_user("alice", 10).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_user_newest_first_with_limit() {
        let store = SqliteStore::in_memory().unwrap();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut intent = create_test_intent(id, "alice", "1");
            intent.created_at = 1_000 + i as u64;
            store.insert_intent(&intent).await.unwrap();
        }

        let listed = store.list_intents_by_user("alice", 2).await.unwrap();
        let ids: Vec<_> = listed.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_store_concurrent_claims_and_deltas() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(dir.path().join("vault.db")).unwrap();
        store.insert_intent(&create_test_intent("t1", "alice", "1")).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let won = store
                    .claim_for_minting("t1", Some(&format!("sig:{}", i)))
                    .await
                    .unwrap();
                store.apply_delta(dec("0.5"), dec("0.5")).await.unwrap();
                won
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        let vault = store.get_or_create().await.unwrap();
        assert_eq!(vault.total_deposited, dec("8"));
        assert_eq!(vault.version, 16);
    }
}
