//! CLI command implementations

use anyhow::{Context, Result};
use dialoguer::Confirm;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::{RetryingClient, WalletApi};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::notify::{self, ChatNotifier, LogNotifier, Notifier, TelegramBot};
use crate::provision;
use crate::store::{JsonAccountStore, JsonBalanceStore, JsonRecipientStore};
use crate::wallet::{derive_bundle, Mnemonic};
use crate::watch::{BalanceWatcher, WatchSettings};

fn wallet_api(config: &Config, clock: Arc<dyn Clock>) -> Result<WalletApi> {
    config.require_api_credentials()?;
    let client = RetryingClient::from_config(&config.api, clock)
        .context("Failed to create wallet API client")?;
    Ok(WalletApi::new(client))
}

async fn account_store(config: &Config) -> Result<Arc<JsonAccountStore>> {
    let path = config.accounts_path();
    let store = JsonAccountStore::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn balance_store(config: &Config) -> Result<Arc<JsonBalanceStore>> {
    let path = config.balances_path();
    let store = JsonBalanceStore::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn recipient_store(config: &Config) -> Result<Arc<JsonRecipientStore>> {
    let path = config.chats_path();
    let store = JsonRecipientStore::open(&path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(Arc::new(store))
}

/// Telegram when a bot token is configured, otherwise log-only
async fn notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    if config.telegram.bot_token.is_empty() {
        warn!("telegram.bot_token not set - notifications will only be logged");
        return Ok(Arc::new(LogNotifier));
    }

    let bot = TelegramBot::new(&config.telegram)?;
    let recipients = recipient_store(config).await?;
    Ok(Arc::new(ChatNotifier::new(Arc::new(bot), recipients)))
}

/// Run the balance watcher until Ctrl-C
pub async fn watch(config: &Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = wallet_api(config, clock.clone())?;

    let mut watcher = BalanceWatcher::new(
        api,
        account_store(config).await?,
        balance_store(config).await?,
        notifier(config).await?,
        clock,
        WatchSettings::from_config(&config.watch),
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping after the current cycle");
            signal.cancel();
        }
    });

    watcher.run(shutdown).await?;
    Ok(())
}

/// Derive and store configured wallets, then register the unregistered ones
pub async fn provision(config: &Config, skip_register: bool) -> Result<()> {
    if config.wallets.mnemonic_list.is_empty() {
        warn!("wallets.mnemonic_list is empty - nothing to derive");
    }

    let accounts = account_store(config).await?;
    let derived = provision::provision_wallets(
        &config.wallets.mnemonic_list,
        config.wallets.accounts_per_wallet,
        config.wallets.derive_concurrency,
        accounts.as_ref(),
    )
    .await?;
    info!(
        "Derivation: {} stored, {} skipped",
        derived.succeeded, derived.failed
    );

    if skip_register {
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = wallet_api(config, clock.clone())?;
    let registered = provision::register_wallets(
        &api,
        accounts.as_ref(),
        clock.as_ref(),
        Duration::from_millis(config.wallets.registration_delay_ms),
    )
    .await?;
    info!(
        "Registration: {} registered, {} failed",
        registered.succeeded, registered.failed
    );

    if registered.failed > 0 {
        anyhow::bail!("{} wallets failed to register", registered.failed);
    }
    Ok(())
}

/// Delete all remote accounts and reset local remote ids and balances
pub async fn clear(config: &Config, force: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt("Delete ALL remote wallet accounts and reset local records?")
            .default(false)
            .interact()?;

        if !confirmed {
            info!("Clear cancelled by user");
            return Ok(());
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let api = wallet_api(config, clock.clone())?;
    let accounts = account_store(config).await?;
    let balances = balance_store(config).await?;

    let report = provision::clear_remote_accounts(
        &api,
        accounts.as_ref(),
        balances.as_ref(),
        clock.as_ref(),
        Duration::from_millis(config.wallets.registration_delay_ms),
    )
    .await?;

    info!(
        "Deleted {} remote accounts ({} failed); local records reset",
        report.succeeded, report.failed
    );
    Ok(())
}

/// Print derived addresses for one mnemonic
pub fn derive(phrase: &str, count: u32, show_keys: bool) -> Result<()> {
    let mnemonic = Mnemonic::parse(phrase)?;

    println!("\n=== DERIVED ADDRESSES ===\n");
    for index in 0..count {
        let bundle = derive_bundle(&mnemonic, index)?;
        println!("Index {}:", index);
        for entry in bundle.entries() {
            println!("  {:<7} {}", entry.chain, entry.address);
            if show_keys {
                println!("          key: {}", entry.private_key);
            }
        }
        if bundle.tron.is_none() {
            println!("  tron    (not derived for the primary index)");
        }
    }

    if !show_keys {
        println!("\nPrivate keys hidden. Pass --show-keys to print them.");
    }
    Ok(())
}

/// Store chat ids of everyone who has messaged the bot
pub async fn record_chats(config: &Config) -> Result<()> {
    let bot = TelegramBot::new(&config.telegram)?;
    let store = recipient_store(config).await?;

    let added = notify::record_chat_ids(&bot, store.as_ref()).await?;
    info!("Recorded {} new chats", added);
    Ok(())
}

/// Show current configuration (secrets masked)
pub fn show_config(config: &Config) -> Result<()> {
    println!("{}", config.masked_display());
    Ok(())
}
