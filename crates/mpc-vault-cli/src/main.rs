//! MPC Vault CLI
//!
//! Command-line driver for the vault: key generation against the in-process
//! counter-party and the Ethereum/Bitcoin demo flow.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use mpc_vault_core::chain::evm::ZERO_ADDRESS;
use mpc_vault_core::chain::{ChainWallet, FeePolicy, Wallet};
use mpc_vault_core::mpc::LocalMpcRuntime;
use mpc_vault_core::orchestrator::{FixedAmount, FractionOfBalance};
use mpc_vault_core::{ChainType, Credentials, KeygenScheme, MpcVault, VaultConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Recipient of the Bitcoin demo transfer (testnet faucet return address)
const DEFAULT_BTC_RECIPIENT: &str = "tb1qw2c3lxufxqe2x9s4rdzh65tpf4d7fssjgh8nv6";

#[derive(Parser)]
#[command(name = "mpc-vault")]
#[command(about = "MPC Vault CLI", version)]
struct Cli {
    /// Path to a TOML config file (defaults: Sepolia + Bitcoin testnet)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Account e-mail for the signing service
    #[arg(long, global = true, env = "MPC_VAULT_EMAIL", default_value = "demo@example.com")]
    email: String,

    /// Account password for the signing service
    #[arg(long, global = true, env = "MPC_VAULT_PASSWORD", default_value = "demo")]
    password: String,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Scheme {
    /// Pairwise 2-of-2
    Pairwise,
    /// N-of-N threshold (see --parties)
    Threshold,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key share with the local counter-party and show the wallets
    Keygen {
        #[arg(short, long, value_enum, default_value = "pairwise")]
        scheme: Scheme,

        /// Number of parties for the threshold scheme
        #[arg(short, long, default_value_t = 3)]
        parties: usize,

        /// Write the key share (JSON, includes the secret share) to this file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the wallet demo: balances, then optional transfers
    Demo {
        /// Send a tenth of the Ethereum balance to the zero address
        #[arg(long)]
        send_eth: bool,

        /// Send satoshi to the Bitcoin recipient
        #[arg(long)]
        send_btc: Option<u64>,

        /// Bitcoin recipient address
        #[arg(long, default_value = DEFAULT_BTC_RECIPIENT)]
        btc_to: String,

        /// Bitcoin fee rate in sat/vB
        #[arg(long, default_value_t = 1)]
        fee_rate: u64,
    },

    /// Show version and effective configuration
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = load_config(cli.config.as_deref()).await?;
    let credentials = Credentials::password(cli.email.clone(), cli.password.clone());

    match cli.command {
        Commands::Keygen {
            scheme,
            parties,
            out,
        } => {
            let scheme = match scheme {
                Scheme::Pairwise => KeygenScheme::Pairwise2of2,
                Scheme::Threshold => KeygenScheme::ThresholdNofN(parties),
            };
            run_keygen(config, &credentials, scheme, out.as_deref()).await?;
        }
        Commands::Demo {
            send_eth,
            send_btc,
            btc_to,
            fee_rate,
        } => {
            let transfers = Transfers {
                send_eth,
                send_btc,
                btc_to,
                fee_rate,
            };
            run_demo(config, &credentials, transfers).await?;
        }
        Commands::Info => show_info(&config),
    }

    Ok(())
}

async fn load_config(path: Option<&Path>) -> Result<VaultConfig> {
    match path {
        Some(path) => VaultConfig::load(path)
            .await
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(VaultConfig::default()),
    }
}

fn local_runtime(config: &VaultConfig, credentials: &Credentials) -> Arc<LocalMpcRuntime> {
    Arc::new(
        LocalMpcRuntime::new()
            .with_account(credentials.email.clone(), credentials.password.clone())
            .with_timeout_secs(config.session.timeout_secs),
    )
}

async fn open_vault(config: VaultConfig, credentials: &Credentials) -> Result<MpcVault> {
    let runtime = local_runtime(&config, credentials);
    let vault = MpcVault::connect(runtime, config)?;
    vault.sign_in(credentials).await?;
    Ok(vault)
}

async fn run_keygen(
    config: VaultConfig,
    credentials: &Credentials,
    scheme: KeygenScheme,
    out: Option<&Path>,
) -> Result<()> {
    info!(%scheme, "Generating key share with the local counter-party");

    let vault = open_vault(config, credentials).await?;
    let share = vault.generate_key_share(scheme).await?;

    println!("\nKey generation completed!\n");
    println!("Scheme: {}", scheme);
    println!("Public Key: 0x{}", share.public_key_hex());
    println!("Group: {}", share.parameters.group_id);
    print_wallets(&vault);

    if let Some(path) = out {
        let json = serde_json::to_string_pretty(share.as_ref())?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("writing key share to {}", path.display()))?;
        println!("\nKey share written to {}", path.display());
    }

    vault.shutdown().await?;
    Ok(())
}

struct Transfers {
    send_eth: bool,
    send_btc: Option<u64>,
    btc_to: String,
    fee_rate: u64,
}

async fn run_demo(
    config: VaultConfig,
    credentials: &Credentials,
    transfers: Transfers,
) -> Result<()> {
    let vault = open_vault(config, credentials).await?;

    vault.generate_key_share(KeygenScheme::Pairwise2of2).await?;
    print_wallets(&vault);

    println!("\nBalances:");
    for wallet in [ChainType::Evm, ChainType::Bitcoin]
        .into_iter()
        .filter_map(|chain| vault.wallet(chain))
    {
        print_balance(&wallet).await;
    }

    if transfers.send_eth {
        let policy = FractionOfBalance::new(ZERO_ADDRESS, 10, FeePolicy::ProviderDefault);
        match vault.send_ethereum(&policy).await {
            Ok(result) => print_result("Ethereum", &result.hash, result.explorer_url.as_deref()),
            Err(e) => println!("\n[FAILED] Ethereum transfer: {}", e),
        }
    }

    if let Some(amount) = transfers.send_btc {
        let policy = FixedAmount::new(
            transfers.btc_to,
            u128::from(amount),
            FeePolicy::PerByte(transfers.fee_rate),
        );
        match vault.send_bitcoin(&policy).await {
            Ok(result) => print_result("Bitcoin", &result.hash, result.explorer_url.as_deref()),
            Err(e) => println!("\n[FAILED] Bitcoin transfer: {}", e),
        }
    }

    vault.shutdown().await?;
    Ok(())
}

fn print_wallets(vault: &MpcVault) {
    println!("\nWallets:");
    match vault.ethereum_wallet() {
        Some(wallet) => println!("  Ethereum: {}", wallet.address()),
        None => println!("  Ethereum: unavailable"),
    }
    match vault.bitcoin_wallet() {
        Some(wallet) => println!("  Bitcoin:  {}", wallet.address()),
        None => println!("  Bitcoin:  unavailable"),
    }
}

async fn print_balance(wallet: &Wallet) {
    match wallet.get_balance().await {
        Ok(balance) => println!("  {}: {}", wallet.chain(), balance),
        Err(e) => println!("  {}: unavailable ({})", wallet.chain(), e),
    }
}

fn print_result(chain: &str, hash: &str, explorer_url: Option<&str>) {
    println!("\n[SENT] {} transaction: {}", chain, hash);
    if let Some(url) = explorer_url {
        println!("   Explorer: {}", url);
    }
}

fn show_info(config: &VaultConfig) {
    println!("MPC Vault v{}", mpc_vault_core::VERSION);
    println!();
    println!("Configuration:");
    println!("  EVM chain: {}", config.evm.chain_id);
    println!("  RPC endpoints: {}", config.evm.rpc_urls.join(", "));
    println!("  EIP-1559: {}", config.evm.eip1559_supported);
    println!("  Bitcoin network: {}", config.bitcoin.network);
    println!("  Esplora: {}", config.bitcoin.esplora_url);
    println!("  Session timeout: {}s", config.session.timeout_secs);
    println!();
    println!("Key Schemes:");
    println!("  - pairwise 2-of-2");
    println!("  - threshold N-of-N");
}
