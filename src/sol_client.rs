//! Solana Settlement Client
//!
//! Thin client over the Solana RPC for the vault authority. It mints the
//! derivative, pays out and refunds the base asset, and builds and submits
//! the co-signed unstake transaction. The engine never talks to RPC directly;
//! it goes through [`SettlementLedger`], which tests mock.
//!
//! Instructions are assembled by hand (SPL Token, Associated Token Account,
//! System and Memo programs) so the only Solana dependencies are the SDK and
//! the RPC client.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    signature::{Keypair, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::str::FromStr;

// ============================================================================
// Constants
// ============================================================================

/// Solana devnet RPC endpoint
pub const DEVNET_RPC: &str = "https://api.devnet.solana.com";

/// Solana testnet RPC endpoint
pub const TESTNET_RPC: &str = "https://api.testnet.solana.com";

/// Solana mainnet-beta RPC endpoint
pub const MAINNET_RPC: &str = "https://api.mainnet-beta.solana.com";

/// SPL Token program ID
pub const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// Associated Token Account program ID
pub const ATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// SPL Memo program ID
pub const MEMO_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr");

/// SPL Token instruction tags
const TOKEN_IX_MINT_TO: u8 = 7;
const TOKEN_IX_BURN: u8 = 8;

/// ATA program `CreateIdempotent` tag
const ATA_IX_CREATE_IDEMPOTENT: u8 = 1;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid transaction encoding: {0}")]
    Encoding(String),
}

// ============================================================================
// Settlement Ledger Seam
// ============================================================================

/// Operations the engine needs from the settlement ledger
///
/// Amounts are in base units (lamports / derivative base units, 9 decimals).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SettlementLedger: Send + Sync {
    /// Vault authority: mint authority, payout source and fee payer
    fn authority(&self) -> Pubkey;

    /// Mint `amount` derivative to `recipient`'s associated token account
    async fn mint_derivative(&self, recipient: &Pubkey, amount: u64) -> Result<String, LedgerError>;

    /// Send `amount` lamports from the vault authority to `recipient` and confirm
    async fn transfer_base(&self, recipient: &Pubkey, amount: u64) -> Result<String, LedgerError>;

    /// Build the burn-and-payout transaction, pre-signed by the authority
    async fn build_unstake_transaction(
        &self,
        user: &Pubkey,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, LedgerError>;

    /// Submit a fully signed transaction and wait for confirmation
    async fn submit_transaction(&self, tx: &Transaction) -> Result<String, LedgerError>;

    /// Lamport balance of `owner`
    async fn balance(&self, owner: &Pubkey) -> Result<u64, LedgerError>;
}

// ============================================================================
// Instruction Builders
// ============================================================================

/// Parse pubkey from string
pub fn parse_pubkey(s: &str) -> Result<Pubkey, LedgerError> {
    Pubkey::from_str(s).map_err(|e| LedgerError::InvalidAddress(format!("{}: {}", s, e)))
}

/// Associated token address of `owner` for `mint` (classic SPL Token)
pub fn associated_token_address(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

/// Create `owner`'s associated token account if missing
pub fn create_ata_idempotent_ix(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    let ata = associated_token_address(owner, mint);

    Instruction {
        program_id: ATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(solana_sdk::system_program::ID, false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_IX_CREATE_IDEMPOTENT],
    }
}

fn token_amount_data(tag: u8, amount: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(9);
    data.push(tag);
    data.extend_from_slice(&amount.to_le_bytes());
    data
}

/// SPL Token `MintTo`
pub fn mint_to_ix(mint: &Pubkey, destination: &Pubkey, authority: &Pubkey, amount: u64) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data: token_amount_data(TOKEN_IX_MINT_TO, amount),
    }
}

/// SPL Token `Burn`
pub fn burn_ix(account: &Pubkey, mint: &Pubkey, owner: &Pubkey, amount: u64) -> Instruction {
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*account, false),
            AccountMeta::new(*mint, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data: token_amount_data(TOKEN_IX_BURN, amount),
    }
}

/// SPL Memo carrying a UTF-8 note
pub fn memo_ix(memo: &str) -> Instruction {
    Instruction {
        program_id: MEMO_PROGRAM_ID,
        accounts: vec![],
        data: memo.as_bytes().to_vec(),
    }
}

/// Burn `amount` derivative from `user` and pay `amount` lamports back, tagged
/// with `memo`. The authority is fee payer and signs; the user's slot is left
/// empty for the wallet to fill.
pub fn unstake_transaction(
    authority: &Keypair,
    user: &Pubkey,
    mint: &Pubkey,
    amount: u64,
    memo: &str,
    recent_blockhash: Hash,
) -> Result<Transaction, LedgerError> {
    let user_ata = associated_token_address(user, mint);
    let instructions = [
        burn_ix(&user_ata, mint, user, amount),
        system_instruction::transfer(&authority.pubkey(), user, amount),
        memo_ix(memo),
    ];

    let mut tx = Transaction::new_with_payer(&instructions, Some(&authority.pubkey()));
    tx.try_partial_sign(&[authority], recent_blockhash)
        .map_err(|e| LedgerError::Signing(e.to_string()))?;

    Ok(tx)
}

/// Wire encoding of a transaction handed to wallets: base64(bincode)
pub fn encode_transaction(tx: &Transaction) -> Result<String, LedgerError> {
    let bytes = bincode::serialize(tx).map_err(|e| LedgerError::Encoding(e.to_string()))?;
    Ok(BASE64.encode(bytes))
}

/// Inverse of [`encode_transaction`]
pub fn decode_transaction(payload: &str) -> Result<Transaction, LedgerError> {
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| LedgerError::Encoding(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| LedgerError::Encoding(e.to_string()))
}

// ============================================================================
// Solana RPC Client
// ============================================================================

pub struct SolClient {
    rpc: RpcClient,
    authority: Keypair,
    derivative_mint: Pubkey,
}

impl SolClient {
    pub fn new(rpc_url: &str, authority: Keypair, derivative_mint: Pubkey) -> Self {
        let rpc = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());

        Self {
            rpc,
            authority,
            derivative_mint,
        }
    }

    pub fn derivative_mint(&self) -> &Pubkey {
        &self.derivative_mint
    }

    /// Check connection
    pub async fn is_connected(&self) -> bool {
        self.rpc.get_health().await.is_ok()
    }

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }

    /// Sign with the authority, send and confirm
    async fn send_transaction(&self, instructions: &[Instruction]) -> Result<String, LedgerError> {
        let recent_blockhash = self.latest_blockhash().await?;

        let tx = Transaction::new_signed_with_payer(
            instructions,
            Some(&self.authority.pubkey()),
            &[&self.authority],
            recent_blockhash,
        );

        self.submit_transaction(&tx).await
    }
}

#[async_trait]
impl SettlementLedger for SolClient {
    fn authority(&self) -> Pubkey {
        self.authority.pubkey()
    }

    async fn mint_derivative(&self, recipient: &Pubkey, amount: u64) -> Result<String, LedgerError> {
        let authority = self.authority.pubkey();
        let destination = associated_token_address(recipient, &self.derivative_mint);

        let instructions = [
            create_ata_idempotent_ix(&authority, recipient, &self.derivative_mint),
            mint_to_ix(&self.derivative_mint, &destination, &authority, amount),
        ];

        self.send_transaction(&instructions).await
    }

    async fn transfer_base(&self, recipient: &Pubkey, amount: u64) -> Result<String, LedgerError> {
        let ix = system_instruction::transfer(&self.authority.pubkey(), recipient, amount);
        self.send_transaction(&[ix]).await
    }

    async fn build_unstake_transaction(
        &self,
        user: &Pubkey,
        amount: u64,
        memo: &str,
    ) -> Result<Transaction, LedgerError> {
        let recent_blockhash = self.latest_blockhash().await?;
        unstake_transaction(
            &self.authority,
            user,
            &self.derivative_mint,
            amount,
            memo,
            recent_blockhash,
        )
    }

    async fn submit_transaction(&self, tx: &Transaction) -> Result<String, LedgerError> {
        let sig = self
            .rpc
            .send_and_confirm_transaction(tx)
            .await
            .map_err(|e| LedgerError::Rpc(format!("Transaction failed: {}", e)))?;

        tracing::info!(target: "stakevault::ledger", signature = %sig, "Transaction confirmed");
        Ok(sig.to_string())
    }

    async fn balance(&self, owner: &Pubkey) -> Result<u64, LedgerError> {
        self.rpc
            .get_balance(owner)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Load a keypair from a Solana CLI JSON file (array of 64 bytes)
pub fn load_keypair_from_file(path: &str) -> Result<Keypair, LedgerError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| LedgerError::InvalidKeypair(format!("{}: {}", path, e)))?;
    let bytes: Vec<u8> = serde_json::from_str(&content)
        .map_err(|e| LedgerError::InvalidKeypair(e.to_string()))?;
    Keypair::try_from(bytes.as_slice()).map_err(|e| LedgerError::InvalidKeypair(e.to_string()))
}
