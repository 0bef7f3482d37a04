//! StakeVault Backend
//!
//! Run modes:
//!   stakevault serve [--port <port>] [--memory]  - Start the REST API
//!   stakevault vault                             - Print vault totals
//!   stakevault unresolved                        - Print intents needing an operator
//!   stakevault config                            - Print configuration summary

use clap::{Parser, Subcommand};
use solana_sdk::signature::Signer;
use std::sync::Arc;

use stakevault::api::{self, AppState};
use stakevault::logging::{init_from_config, log_system_event};
use stakevault::types::units::format_amount;
use stakevault::{
    load_keypair_from_file, MemoryStore, Network, SettlementEngine, SettlementStore, SolClient, SqliteStore,
    StakeVaultError, VaultConfig,
};

#[derive(Parser)]
#[command(name = "stakevault")]
#[command(about = "Settlement and reconciliation engine for a custodial SOL staking vault")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API
    Serve {
        /// Port (overrides VAULT_API_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Use the in-memory store instead of SQLite (development only)
        #[arg(long)]
        memory: bool,
    },

    /// Print vault ledger totals and on-chain reserves
    Vault,

    /// Print failed and stuck intents
    Unresolved,

    /// Print the configuration summary
    Config,
}

#[tokio::main]
async fn main() -> Result<(), StakeVaultError> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = VaultConfig::from_env()?;
    if config.network == Network::Mainnet {
        config.validate_for_production()?;
    }

    match cli.command {
        Commands::Config => {
            config.print_summary();
            Ok(())
        }
        Commands::Serve { port, memory } => {
            init_from_config(&config)?;
            let engine = build_engine(&config, memory).await?;
            let state = AppState::new(engine, config.webhook_secret.clone());

            let store = if memory { "memory" } else { config.db_path.as_str() };
            log_system_event(
                "startup",
                serde_json::json!({
                    "network": format!("{:?}", config.network),
                    "store": store,
                    "webhook_auth": config.webhook_secret.is_some(),
                }),
            );
            api::start_server(state, port.unwrap_or(config.api_port)).await
        }
        Commands::Vault => {
            let engine = build_engine(&config, false).await?;
            let summary = engine.vault_summary().await?;

            println!("=== Vault Ledger ===");
            println!("Total Deposited: {}", format_amount(summary.total_deposited, &config.base_asset));
            println!("Total Minted:    {}", format_amount(summary.total_minted, &config.base_asset));
            println!("Pegged:          {}", summary.pegged);
            println!("Version:         {}", summary.version);
            match summary.authority_balance {
                Some(balance) => println!("Reserves:        {}", format_amount(balance, &config.base_asset)),
                None => println!("Reserves:        (ledger unavailable)"),
            }
            Ok(())
        }
        Commands::Unresolved => {
            let engine = build_engine(&config, false).await?;
            let report = engine.unresolved().await?;

            if report.is_empty() {
                println!("No unresolved intents");
                return Ok(());
            }
            for (title, items) in [
                ("Failed stakes (refund failed)", &report.failed_stakes),
                ("In-flight stakes", &report.in_flight_stakes),
                ("Unstakes", &report.unstakes),
            ] {
                println!("=== {} ({}) ===", title, items.len());
                for item in items {
                    println!(
                        "  {} {} {} {} {}",
                        item.id,
                        item.status,
                        item.user,
                        format_amount(item.amount, &config.base_asset),
                        item.settlement_signature.as_deref().unwrap_or("-")
                    );
                }
            }
            Ok(())
        }
    }
}

/// Wire the engine to the Solana client and the configured store
async fn build_engine(config: &VaultConfig, memory: bool) -> Result<Arc<SettlementEngine>, StakeVaultError> {
    let authority = load_keypair_from_file(&config.authority_keypair_path)?;
    let settings = config.settlement_settings(&authority.pubkey())?;
    let ledger = SolClient::new(&config.solana_rpc, authority, settings.derivative_mint);
    if !ledger.is_connected().await {
        tracing::warn!(target: "stakevault::ledger", rpc = %config.solana_rpc, "Solana RPC unreachable at startup");
    }

    let store: Arc<dyn SettlementStore> = if memory {
        tracing::warn!(target: "stakevault::system", "Using in-memory store; state is lost on exit");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SqliteStore::new(&config.db_path)?)
    };

    Ok(Arc::new(SettlementEngine::new(store, Arc::new(ledger), settings)))
}
