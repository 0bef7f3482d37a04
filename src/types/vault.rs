//! Vault Ledger Types

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::intent::now_millis;

/// Singleton row ID of the vault ledger
pub const VAULT_LEDGER_ID: i64 = 1;

/// The vault aggregate: running totals of accepted deposits and outstanding mints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultLedger {
    pub id: i64,
    /// Base asset ever accepted, net of payouts
    pub total_deposited: Decimal,
    /// Derivative minted and outstanding
    pub total_minted: Decimal,
    /// Incremented by every applied delta
    pub version: u64,
    pub updated_at: u64,
}

impl VaultLedger {
    /// Fresh, empty ledger
    pub fn empty() -> Self {
        Self {
            id: VAULT_LEDGER_ID,
            total_deposited: Decimal::ZERO,
            total_minted: Decimal::ZERO,
            version: 0,
            updated_at: now_millis(),
        }
    }

    /// 1:1 peg between deposits and outstanding derivative
    pub fn is_pegged(&self) -> bool {
        self.total_deposited == self.total_minted
    }

    /// Apply a delta in place (callers must hold the aggregate exclusively)
    pub fn apply(&mut self, deposit_delta: Decimal, mint_delta: Decimal) {
        self.total_deposited += deposit_delta;
        self.total_minted += mint_delta;
        self.version += 1;
        self.updated_at = now_millis();
    }
}

impl Default for VaultLedger {
    fn default() -> Self {
        Self::empty()
    }
}
