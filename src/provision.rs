//! Wallet provisioning and remote account maintenance
//!
//! Derivation runs concurrently on blocking threads; every store write and
//! every remote call happens sequentially from the calling task.

use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::api::{AddressEntry, RetryPolicy, WalletApi};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::{AccountStore, BalanceStore};
use crate::util::run_bounded;
use crate::wallet::{derive_wallet, Mnemonic, WalletAccount};

/// Attempt bound for listing accounts before a bulk delete
pub const CLEAR_LIST_ATTEMPTS: u32 = 6;

/// Outcome counters for a batch of remote calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub succeeded: usize,
    pub failed: usize,
}

/// Derive bundles `0..accounts_per_wallet` for every configured mnemonic not
/// yet stored, and append them. Invalid mnemonics are logged and skipped.
pub async fn provision_wallets(
    mnemonics: &[String],
    accounts_per_wallet: u32,
    concurrency: usize,
    store: &dyn AccountStore,
) -> Result<BatchReport> {
    let stored: HashSet<String> = store
        .all()
        .await?
        .into_iter()
        .map(|w| w.mnemonic)
        .collect();

    let mut seen = HashSet::new();
    let pending: Vec<(usize, String)> = mnemonics
        .iter()
        .enumerate()
        .filter(|(_, phrase)| {
            let normalized = normalize(phrase);
            !stored.contains(&normalized) && seen.insert(normalized)
        })
        .map(|(position, phrase)| (position, phrase.clone()))
        .collect();

    if pending.is_empty() {
        info!("All {} configured mnemonics are already provisioned", mnemonics.len());
        return Ok(BatchReport::default());
    }
    info!("Deriving {} new wallets", pending.len());

    let derived = run_bounded(concurrency, pending, |(position, phrase)| async move {
        let result = tokio::task::spawn_blocking(move || derive_wallet(&phrase, accounts_per_wallet))
            .await
            .map_err(|e| Error::Internal(format!("derivation task failed: {}", e)))
            .and_then(|r| r);
        (position, result)
    })
    .await;

    let mut report = BatchReport::default();
    for (position, result) in derived {
        match result {
            Ok(wallet) => {
                store.append(wallet).await?;
                info!("Stored wallet #{} with {} bundles", position, accounts_per_wallet);
                report.succeeded += 1;
            }
            Err(e) => {
                // position only: the phrase itself is secret
                error!("Skipping mnemonic #{}: {}", position, e);
                report.failed += 1;
            }
        }
    }
    Ok(report)
}

/// Addresses a wallet registers under: solana→501, evm→1 and 56, tron→195
pub fn registration_addresses(wallet: &WalletAccount) -> Vec<AddressEntry> {
    let mut bundles: Vec<_> = wallet.accounts.iter().collect();
    bundles.sort_by_key(|b| b.index);

    bundles
        .into_iter()
        .flat_map(|bundle| bundle.entries())
        .filter(|entry| !entry.address.is_empty())
        .flat_map(|entry| {
            entry
                .chain
                .chain_indices()
                .iter()
                .map(move |index| AddressEntry::new(entry.address.clone(), *index))
        })
        .collect()
}

/// Register every stored wallet that has no remote id yet.
///
/// Each creation is a single attempt. A failure is logged and the remaining
/// wallets are still processed.
pub async fn register_wallets(
    api: &WalletApi,
    store: &dyn AccountStore,
    clock: &dyn Clock,
    delay: Duration,
) -> Result<BatchReport> {
    let unregistered: Vec<WalletAccount> = store
        .all()
        .await?
        .into_iter()
        .filter(|w| !w.is_registered())
        .collect();
    info!("{} wallets awaiting registration", unregistered.len());

    let mut report = BatchReport::default();
    for wallet in unregistered {
        let addresses = registration_addresses(&wallet);
        if addresses.is_empty() {
            warn!("Wallet has no derived addresses, skipping registration");
            report.failed += 1;
            continue;
        }

        let registered = match api.create_wallet_account(&addresses).await {
            Ok(account_id) => store
                .set_remote_account_id(&wallet.mnemonic, Some(account_id.clone()))
                .await
                .map(|()| account_id),
            Err(e) => Err(e),
        };

        match registered {
            Ok(account_id) => {
                info!(
                    "Registered {} addresses as account {}",
                    addresses.len(),
                    account_id
                );
                report.succeeded += 1;
            }
            Err(e) => {
                error!("Failed to register wallet: {}", e);
                report.failed += 1;
            }
        }

        clock.sleep(delay).await;
    }

    Ok(report)
}

/// Delete every remote account, then forget all remote ids and balances
pub async fn clear_remote_accounts(
    api: &WalletApi,
    accounts: &dyn AccountStore,
    balances: &dyn BalanceStore,
    clock: &dyn Clock,
    delay: Duration,
) -> Result<BatchReport> {
    let list_policy: RetryPolicy = api.client().policy().with_attempts(CLEAR_LIST_ATTEMPTS);
    let ids = api.accounts_with_policy(list_policy).await?;

    let mut report = BatchReport::default();
    for account_id in ids {
        match api.delete_account(&account_id).await {
            Ok(()) => {
                info!("Deleted remote account {}", account_id);
                report.succeeded += 1;
            }
            Err(e) => {
                error!("Failed to delete remote account {}: {}", account_id, e);
                report.failed += 1;
            }
        }
        clock.sleep(delay).await;
    }

    accounts.clear_remote_account_ids().await?;
    balances.clear().await?;
    info!("Local remote ids and balance records reset");

    Ok(report)
}

fn normalize(phrase: &str) -> String {
    Mnemonic::parse(phrase)
        .map(|m| m.phrase())
        .unwrap_or_else(|_| phrase.split_whitespace().collect::<Vec<_>>().join(" "))
}
