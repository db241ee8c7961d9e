//! The poll → diff → match → notify loop

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::diff::{compare_balances, BalanceChange};
use crate::api::WalletApi;
use crate::clock::Clock;
use crate::config::WatchConfig;
use crate::error::Result;
use crate::notify::Notifier;
use crate::store::{AccountStore, BalanceMap, BalanceStore};
use crate::util::{random_delay, shuffle};
use crate::wallet::AccountMatcher;

/// Loop pacing and thresholds
#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub batch_delay: Duration,
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,
    pub change_threshold: f64,
    pub dust_threshold: f64,
}

impl WatchSettings {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            pacing_min_ms: config.pacing_min_ms,
            pacing_max_ms: config.pacing_max_ms,
            change_threshold: config.change_threshold,
            dust_threshold: config.dust_threshold,
        }
    }
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self::from_config(&WatchConfig::default())
    }
}

/// What one cycle did
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Accounts whose value was fetched and persisted
    pub fetched: usize,
    /// Accounts skipped after a failed fetch
    pub skipped: usize,
    pub changes: Vec<BalanceChange>,
    pub notifications: usize,
}

/// Sequential balance watcher. Owns all writes to the balance store.
pub struct BalanceWatcher {
    api: WalletApi,
    accounts: Arc<dyn AccountStore>,
    balances: Arc<dyn BalanceStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    settings: WatchSettings,
    matcher: AccountMatcher,
    /// Remote account ids, fetched once per process
    remote_accounts: Vec<String>,
    /// Snapshot the next cycle is diffed against
    last_balances: BalanceMap,
}

impl BalanceWatcher {
    pub fn new(
        api: WalletApi,
        accounts: Arc<dyn AccountStore>,
        balances: Arc<dyn BalanceStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        settings: WatchSettings,
    ) -> Self {
        let matcher = AccountMatcher::new(settings.dust_threshold);
        Self {
            api,
            accounts,
            balances,
            notifier,
            clock,
            settings,
            matcher,
            remote_accounts: Vec::new(),
            last_balances: BalanceMap::new(),
        }
    }

    /// Seed the diff baseline from the persisted balances
    pub async fn init(&mut self) -> Result<()> {
        self.last_balances = self.balances.all().await?;
        info!(
            "Loaded {} last-known balances",
            self.last_balances.len()
        );
        Ok(())
    }

    pub fn last_balances(&self) -> &BalanceMap {
        &self.last_balances
    }

    /// Run cycles until `shutdown` fires. A failed cycle is logged and the
    /// loop carries on; cancellation is observed between cycles only.
    pub async fn run(&mut self, shutdown: CancellationToken) -> Result<()> {
        self.init().await?;
        info!(
            "Watching balances every {}ms",
            self.settings.poll_interval.as_millis()
        );

        while !shutdown.is_cancelled() {
            match self.run_cycle().await {
                Ok(report) => info!(
                    "Cycle done: {} fetched, {} skipped, {} changed, {} notifications",
                    report.fetched,
                    report.skipped,
                    report.changes.len(),
                    report.notifications
                ),
                Err(e) => error!("Watch cycle failed: {}", e),
            }

            debug!("Waiting for next cycle");
            tokio::select! {
                _ = self.clock.sleep(self.settings.poll_interval) => {}
                _ = shutdown.cancelled() => {}
            }
        }

        info!("Balance watcher stopped");
        Ok(())
    }

    /// One fetch → diff → notify pass
    pub async fn run_cycle(&mut self) -> Result<CycleReport> {
        if self.remote_accounts.is_empty() {
            self.remote_accounts = self.api.accounts().await?;
        }

        let mut report = CycleReport::default();
        let current = self.fetch_balances(&mut report).await?;

        let changes = compare_balances(&current, &self.last_balances, self.settings.change_threshold);
        for change in &changes {
            info!(
                "Balance of {} changed: {} -> {} ({:+.2})",
                change.account_id, change.old, change.new, change.diff
            );
            self.balances.set(&change.account_id, &change.new).await?;

            match self.notify_change(change).await {
                Ok(sent) => report.notifications += sent,
                Err(e) => warn!("Could not report change of {}: {}", change.account_id, e),
            }
        }

        report.changes = changes;
        self.last_balances = current;
        Ok(report)
    }

    /// Fetch every account's total value in random order, persisting each
    /// value as soon as it is read
    async fn fetch_balances(&self, report: &mut CycleReport) -> Result<BalanceMap> {
        self.clock.sleep(self.settings.batch_delay).await;

        let mut order = self.remote_accounts.clone();
        shuffle(&mut order);

        let mut current = BalanceMap::new();
        for account_id in order {
            debug!("Fetching total value of {}", account_id);
            match self.api.total_value(&account_id).await {
                Ok(value) => {
                    self.balances.set(&account_id, &value).await?;
                    info!("Account {} total value {}", account_id, value);
                    current.insert(account_id, value);
                    report.fetched += 1;
                }
                Err(e) => {
                    warn!("Skipping account {} this cycle: {}", account_id, e);
                    report.skipped += 1;
                }
            }

            self.clock
                .sleep(random_delay(self.settings.pacing_min_ms, self.settings.pacing_max_ms))
                .await;
        }

        Ok(current)
    }

    /// Resolve the account's non-dust assets to keys and send one message per
    /// asset. Returns the number of deliveries the notifier reported.
    async fn notify_change(&self, change: &BalanceChange) -> Result<usize> {
        let assets = self.api.token_balances(&change.account_id).await?;
        let wallets = self.accounts.all().await?;

        let matches = self
            .matcher
            .match_assets(&change.account_id, &assets, &wallets);
        if matches.is_empty() {
            info!("No reportable assets for {}", change.account_id);
            return Ok(0);
        }

        let mut sent = 0;
        for found in &matches {
            if !found.is_matched() {
                warn!(
                    "No derived key controls {} ({}) in account {}",
                    found.asset().address,
                    found.asset().symbol,
                    change.account_id
                );
            }
            match self.notifier.notify(&found.message()).await {
                Ok(delivered) => sent += delivered,
                Err(e) => warn!("Notification failed: {}", e),
            }
        }
        Ok(sent)
    }
}
