//! Environment-based Configuration for the StakeVault Backend
//!
//! All sensitive values (keypair paths, shared secrets) come from environment
//! variables, never from hardcoded values. A `.env` file is honoured by the
//! binary via `dotenv`.
//!
//! # Environment Variables
//!
//! ## Network Configuration
//! - `VAULT_NETWORK` - "mainnet", "testnet", or "devnet" (default: "devnet")
//! - `VAULT_SOLANA_RPC` - Solana RPC endpoint URL (default: per network)
//!
//! ## Vault Accounts
//! - `VAULT_AUTHORITY_KEYPAIR` - Path to the authority's JSON keypair (required)
//! - `VAULT_ADDRESS` - Address deposits are sent to (default: authority pubkey)
//! - `VAULT_DERIVATIVE_MINT` - Derivative SPL mint, authority is mint authority (required)
//! - `VAULT_BASE_ASSET` - Base asset symbol (default: "SOL")
//!
//! ## Service
//! - `VAULT_DB_PATH` - SQLite database path (default: "data/stakevault.db")
//! - `VAULT_API_PORT` - HTTP port (default: 3003)
//! - `VAULT_WEBHOOK_SECRET` - Shared secret expected in the webhook `Authorization` header
//! - `VAULT_LOG_LEVEL` - Logging level (debug, info, warn, error)
//!
//! ## Limits
//! - `VAULT_MIN_AMOUNT` - Minimum stake/unstake amount (default: 0.001)
//! - `VAULT_MAX_AMOUNT` - Maximum stake/unstake amount (default: per network)
//! - `VAULT_HISTORY_LIMIT` - Default history page size (default: 20)

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Hard cap on history page size
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("network mismatch: expected {0}, got {1}")]
    NetworkMismatch(String, String),

    #[error("not allowed in production: {0}")]
    NotProductionReady(String),
}

/// Network environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
}

impl FromStr for Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mainnet" | "main" | "mainnet-beta" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "devnet" | "dev" => Ok(Network::Devnet),
            _ => Err(ConfigError::InvalidValue(
                "VAULT_NETWORK".to_string(),
                format!("unknown network: {}", s),
            )),
        }
    }
}

impl Network {
    /// Get default Solana RPC for this network
    pub fn default_solana_rpc(&self) -> &'static str {
        match self {
            Network::Mainnet => crate::sol_client::MAINNET_RPC,
            Network::Testnet => crate::sol_client::TESTNET_RPC,
            Network::Devnet => crate::sol_client::DEVNET_RPC,
        }
    }

    /// Default per-request amount ceiling, in whole base asset
    pub fn default_max_amount(&self) -> Decimal {
        match self {
            Network::Mainnet => Decimal::from(1_000),
            Network::Testnet | Network::Devnet => Decimal::from(100_000),
        }
    }

    /// Structured JSON logs outside development
    pub fn json_logs(&self) -> bool {
        matches!(self, Network::Mainnet)
    }
}

/// Engine-facing settings, with addresses already parsed
#[derive(Debug, Clone)]
pub struct SettlementSettings {
    /// Address deposits must be sent to
    pub vault_address: Pubkey,
    /// Derivative mint
    pub derivative_mint: Pubkey,
    /// Base asset symbol recorded on intents
    pub base_asset: String,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    /// Default page size for history queries
    pub history_limit: usize,
}

impl SettlementSettings {
    /// Clamp a caller-requested page size
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history_limit)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Network environment
    pub network: Network,

    /// Solana RPC endpoint
    pub solana_rpc: String,

    /// Path to the authority keypair file
    pub authority_keypair_path: String,

    /// Deposit address, if different from the authority
    pub vault_address: Option<String>,

    /// Derivative mint address
    pub derivative_mint: String,

    /// Base asset symbol
    pub base_asset: String,

    /// SQLite database path
    pub db_path: String,

    /// HTTP port
    pub api_port: u16,

    pub min_amount: Decimal,
    pub max_amount: Decimal,

    /// Default history page size
    pub history_limit: usize,

    /// Webhook shared secret
    pub webhook_secret: Option<String>,

    /// Log level
    pub log_level: String,
}

impl VaultConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let network: Network = env::var("VAULT_NETWORK")
            .unwrap_or_else(|_| "devnet".to_string())
            .parse()?;

        let solana_rpc = env::var("VAULT_SOLANA_RPC")
            .unwrap_or_else(|_| network.default_solana_rpc().to_string());

        let authority_keypair_path = get_required("VAULT_AUTHORITY_KEYPAIR")?;
        let derivative_mint = get_required("VAULT_DERIVATIVE_MINT")?;
        let vault_address = env::var("VAULT_ADDRESS").ok().filter(|v| !v.is_empty());

        let base_asset = env::var("VAULT_BASE_ASSET").unwrap_or_else(|_| "SOL".to_string());
        let db_path = env::var("VAULT_DB_PATH").unwrap_or_else(|_| "data/stakevault.db".to_string());

        let api_port = parse_or("VAULT_API_PORT", 3003u16)?;
        let min_amount = parse_or("VAULT_MIN_AMOUNT", Decimal::new(1, 3))?;
        let max_amount = parse_or("VAULT_MAX_AMOUNT", network.default_max_amount())?;
        let history_limit = parse_or("VAULT_HISTORY_LIMIT", 20usize)?;

        let webhook_secret = env::var("VAULT_WEBHOOK_SECRET").ok().filter(|v| !v.is_empty());
        let log_level = env::var("VAULT_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            network,
            solana_rpc,
            authority_keypair_path,
            vault_address,
            derivative_mint,
            base_asset,
            db_path,
            api_port,
            min_amount,
            max_amount,
            history_limit,
            webhook_secret,
            log_level,
        };
        config.validate()?;

        Ok(config)
    }

    /// Internal consistency checks
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "VAULT_MIN_AMOUNT".to_string(),
                "must be positive".to_string(),
            ));
        }

        if self.max_amount < self.min_amount {
            return Err(ConfigError::InvalidValue(
                "VAULT_MAX_AMOUNT".to_string(),
                "must not be below VAULT_MIN_AMOUNT".to_string(),
            ));
        }

        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(ConfigError::InvalidValue(
                "VAULT_HISTORY_LIMIT".to_string(),
                format!("must be between 1 and {}", MAX_HISTORY_LIMIT),
            ));
        }

        Ok(())
    }

    /// Validate configuration for production readiness
    pub fn validate_for_production(&self) -> Result<(), ConfigError> {
        // Must be mainnet
        if self.network != Network::Mainnet {
            return Err(ConfigError::NetworkMismatch(
                "mainnet".to_string(),
                format!("{:?}", self.network),
            ));
        }

        // Webhook must be authenticated
        if self.webhook_secret.is_none() {
            return Err(ConfigError::NotProductionReady(
                "VAULT_WEBHOOK_SECRET must be set".to_string(),
            ));
        }

        if self.db_path == ":memory:" {
            return Err(ConfigError::NotProductionReady(
                "in-memory database".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse addresses into engine settings
    ///
    /// `authority` is the fallback deposit address when `VAULT_ADDRESS` is unset.
    pub fn settlement_settings(&self, authority: &Pubkey) -> Result<SettlementSettings, ConfigError> {
        let vault_address = match &self.vault_address {
            Some(addr) => parse_pubkey_var("VAULT_ADDRESS", addr)?,
            None => *authority,
        };
        let derivative_mint = parse_pubkey_var("VAULT_DERIVATIVE_MINT", &self.derivative_mint)?;

        Ok(SettlementSettings {
            vault_address,
            derivative_mint,
            base_asset: self.base_asset.clone(),
            min_amount: self.min_amount,
            max_amount: self.max_amount,
            history_limit: self.history_limit,
        })
    }

    /// Print configuration summary (hiding sensitive values)
    pub fn print_summary(&self) {
        println!("=== StakeVault Configuration ===");
        println!("Network: {:?}", self.network);
        println!("Solana RPC: {}", self.solana_rpc);
        println!("Authority Keypair: {}", self.authority_keypair_path);
        println!(
            "Vault Address: {}",
            self.vault_address.as_deref().unwrap_or("(authority)")
        );
        println!("Derivative Mint: {}", self.derivative_mint);
        println!("Base Asset: {}", self.base_asset);
        println!("Database: {}", self.db_path);
        println!("API Port: {}", self.api_port);
        println!("Amount Range: {} - {} {}", self.min_amount, self.max_amount, self.base_asset);
        println!("History Limit: {}", self.history_limit);
        println!(
            "Webhook Secret: {}",
            if self.webhook_secret.is_some() { "(set)" } else { "(none)" }
        );
        println!("Log Level: {}", self.log_level);
        println!("================================");
    }
}

fn get_required(var_name: &str) -> Result<String, ConfigError> {
    env::var(var_name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(var_name.to_string()))
}

fn parse_or<T>(var_name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var_name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidValue(var_name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn parse_pubkey_var(var_name: &str, value: &str) -> Result<Pubkey, ConfigError> {
    Pubkey::from_str(value)
        .map_err(|e| ConfigError::InvalidValue(var_name.to_string(), e.to_string()))
}
