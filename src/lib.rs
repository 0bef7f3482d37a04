//! StakeVault Backend - Settlement and Reconciliation Engine
//!
//! Custodial SOL staking vault: users deposit the base asset and receive a
//! 1:1 derivative token, and burn the derivative to withdraw.
//!
//! ## Flows
//!
//! 1. **Stake** - `POST /stake-init` records a pending intent; the deposit is
//!    observed by `POST /deposit-webhook`, matched, minted (or refunded)
//! 2. **Unstake** - `POST /unstake` builds an authority-signed burn-and-payout
//!    transaction; the user co-signs and submits it back
//!
//! The vault ledger keeps `total_deposited == total_minted` after every
//! completed settlement.

pub mod api;
pub mod common;
pub mod config;
pub mod logging;
pub mod settlement;
pub mod sol_client;
pub mod storage;
pub mod types;

// Re-exports: configuration and errors
pub use common::error::{Result, StakeVaultError};
pub use config::{Network, SettlementSettings, VaultConfig};

// Re-exports: engine
pub use settlement::{ReconcileOutcome, ReconcileReport, SettlementEngine, SettlementError, SharedEngine};

// Re-exports: Solana client
pub use sol_client::{load_keypair_from_file, LedgerError, SettlementLedger, SolClient, DEVNET_RPC};

// Re-exports: storage
pub use storage::{MemoryStore, SettlementStore, SqliteStore, StorageError};
