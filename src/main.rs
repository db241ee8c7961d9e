//! Wallet Watcher - balance-watching agent for a custodial multi-chain wallet API
//!
//! # WARNING
//! - Notifications carry private keys and mnemonics. Only register chats you control.
//! - `clear` deletes every remote account under the configured project.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

// Use the library crate
use wallet_watcher::cli::commands;
use wallet_watcher::config::Config;

/// Wallet Watcher - polls account balances and reports the keys behind changes
#[derive(Parser)]
#[command(name = "watcher")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll balances and notify on changes until Ctrl-C
    Watch,

    /// Derive configured mnemonics and register them as remote accounts
    Provision {
        /// Only derive and store; do not call the remote API
        #[arg(long)]
        skip_register: bool,
    },

    /// Delete all remote accounts and reset local records
    Clear {
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Print addresses derived from a mnemonic
    Derive {
        /// BIP39 mnemonic phrase
        #[arg(long, env = "WATCHER_MNEMONIC", hide_env_values = true)]
        mnemonic: String,

        /// Number of indices to derive
        #[arg(short = 'n', long, default_value = "4")]
        count: u32,

        /// Also print private keys
        #[arg(long)]
        show_keys: bool,
    },

    /// Record chat ids of users who messaged the notification bot
    RecordChats,

    /// Show current configuration (secrets masked)
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "wallet_watcher=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            std::process::exit(1);
        }
    };

    // Perform startup checks
    if let Err(e) = startup_checks(&cli.config, &config) {
        error!("Startup checks failed: {}", e);
        std::process::exit(1);
    }

    // Execute command
    let result = match cli.command {
        Commands::Watch => commands::watch(&config).await,
        Commands::Provision { skip_register } => commands::provision(&config, skip_register).await,
        Commands::Clear { force } => commands::clear(&config, force).await,
        Commands::Derive {
            mnemonic,
            count,
            show_keys,
        } => commands::derive(&mnemonic, count, show_keys),
        Commands::RecordChats => commands::record_chats(&config).await,
        Commands::Config => commands::show_config(&config),
    };

    if let Err(e) = result {
        error!("Command failed: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Perform startup safety checks
fn startup_checks(config_path: &str, config: &Config) -> Result<()> {
    info!("Performing startup checks...");

    // The config file may hold API secrets and mnemonics
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(config_path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "Config file {} has permissions {:o}; run 'chmod 600 {}' if it holds secrets",
                    config_path,
                    mode & 0o777,
                    config_path
                );
            }
        }
    }

    let data_dir = &config.storage.data_dir;
    if data_dir.exists() && !data_dir.is_dir() {
        return Err(anyhow::anyhow!(
            "storage.data_dir {} exists and is not a directory",
            data_dir.display()
        ));
    }

    info!(
        "Startup checks passed: {} mnemonics configured, data in {}",
        config.wallets.mnemonic_list.len(),
        data_dir.display()
    );
    Ok(())
}
