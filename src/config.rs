//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub wallets: WalletsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Remote wallet API credentials and transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default)]
    pub passphrase: String,
    #[serde(default)]
    pub project_id: String,
    /// Optional HTTP(S) proxy for all API traffic
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Attempt bound for idempotent (GET) requests
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

/// Polling loop settings
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Sleep between full cycles
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// A balance change is reported only if |new - old| exceeds this
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
    /// Assets worth less than this (balance x price) are ignored
    #[serde(default = "default_dust_threshold")]
    pub dust_threshold: f64,
    /// Sleep before each batch of per-account fetches
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_pacing_min_ms")]
    pub pacing_min_ms: u64,
    #[serde(default = "default_pacing_max_ms")]
    pub pacing_max_ms: u64,
}

/// Local wallet material and provisioning settings
#[derive(Debug, Clone, Deserialize)]
pub struct WalletsConfig {
    #[serde(default)]
    pub mnemonic_list: Vec<String>,
    /// Number of derivation indices per mnemonic (index 0 is the primary bundle)
    #[serde(default = "default_accounts_per_wallet")]
    pub accounts_per_wallet: u32,
    #[serde(default = "default_derive_concurrency")]
    pub derive_concurrency: usize,
    /// Pause between account registrations / deletions
    #[serde(default = "default_registration_delay_ms")]
    pub registration_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            secret_key: String::new(),
            passphrase: String::new(),
            project_id: String::new(),
            proxy: None,
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            change_threshold: default_change_threshold(),
            dust_threshold: default_dust_threshold(),
            batch_delay_ms: default_batch_delay_ms(),
            pacing_min_ms: default_pacing_min_ms(),
            pacing_max_ms: default_pacing_max_ms(),
        }
    }
}

impl Default for WalletsConfig {
    fn default() -> Self {
        Self {
            mnemonic_list: vec![],
            accounts_per_wallet: default_accounts_per_wallet(),
            derive_concurrency: default_derive_concurrency(),
            registration_delay_ms: default_registration_delay_ms(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            api_base: default_telegram_api_base(),
        }
    }
}

// Default value functions
fn default_base_url() -> String {
    std::env::var("WALLET_API_BASE_URL").unwrap_or_else(|_| "https://web3.okx.com".into())
}

fn default_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_change_threshold() -> f64 {
    1.0
}

fn default_dust_threshold() -> f64 {
    1.0
}

fn default_batch_delay_ms() -> u64 {
    1000
}

fn default_pacing_min_ms() -> u64 {
    1000
}

fn default_pacing_max_ms() -> u64 {
    1200
}

fn default_accounts_per_wallet() -> u32 {
    4
}

fn default_derive_concurrency() -> usize {
    4
}

fn default_registration_delay_ms() -> u64 {
    1500
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("db")
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("api.base_url", default_base_url())?
            .set_default("api.timeout_ms", default_timeout_ms() as i64)?
            .set_default("api.max_retries", default_max_retries() as i64)?
            .set_default("watch.poll_interval_ms", default_poll_interval_ms() as i64)?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix WATCHER_)
            .add_source(
                config::Environment::with_prefix("WATCHER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("wallets.mnemonic_list")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.api.max_retries == 0 {
            anyhow::bail!("api.max_retries must be at least 1");
        }

        if self.watch.change_threshold <= 0.0 {
            anyhow::bail!("watch.change_threshold must be positive");
        }

        if self.watch.dust_threshold <= 0.0 {
            anyhow::bail!("watch.dust_threshold must be positive");
        }

        if self.watch.pacing_min_ms > self.watch.pacing_max_ms {
            anyhow::bail!(
                "watch.pacing_min_ms ({}) cannot exceed watch.pacing_max_ms ({})",
                self.watch.pacing_min_ms,
                self.watch.pacing_max_ms
            );
        }

        if self.wallets.accounts_per_wallet == 0 {
            anyhow::bail!("wallets.accounts_per_wallet must be at least 1");
        }

        if self.wallets.derive_concurrency == 0 {
            anyhow::bail!("wallets.derive_concurrency must be at least 1");
        }

        if let Some(proxy) = self.api.proxy.as_deref().filter(|p| !p.is_empty()) {
            url::Url::parse(proxy).with_context(|| format!("Invalid api.proxy URL: {}", proxy))?;
        }

        Ok(())
    }

    /// Fail unless signing credentials are present
    pub fn require_api_credentials(&self) -> Result<()> {
        if self.api.api_key.is_empty() || self.api.secret_key.is_empty() {
            anyhow::bail!("api.api_key and api.secret_key must be set (WATCHER__API__API_KEY / WATCHER__API__SECRET_KEY)");
        }
        if self.api.passphrase.is_empty() {
            tracing::warn!("api.passphrase is empty - requests will likely be rejected");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.watch.poll_interval_ms)
    }

    pub fn accounts_path(&self) -> PathBuf {
        self.storage.data_dir.join("accounts.json")
    }

    pub fn balances_path(&self) -> PathBuf {
        self.storage.data_dir.join("balances.json")
    }

    pub fn chats_path(&self) -> PathBuf {
        self.storage.data_dir.join("chats.json")
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  API:
    base_url: {}
    api_key: {}
    secret_key: {}
    passphrase: {}
    project_id: {}
    proxy: {}
    timeout: {}ms
    max_retries: {}
  Watch:
    poll_interval: {}ms
    change_threshold: {}
    dust_threshold: {}
    pacing: {}-{}ms
  Wallets:
    mnemonics: {} configured
    accounts_per_wallet: {}
  Storage:
    data_dir: {}
  Telegram:
    bot_token: {}
"#,
            mask_url(&self.api.base_url),
            mask_secret(&self.api.api_key),
            mask_secret(&self.api.secret_key),
            mask_secret(&self.api.passphrase),
            mask_secret(&self.api.project_id),
            self.api
                .proxy
                .as_deref()
                .map(mask_url)
                .unwrap_or_else(|| "(none)".to_string()),
            self.api.timeout_ms,
            self.api.max_retries,
            self.watch.poll_interval_ms,
            self.watch.change_threshold,
            self.watch.dust_threshold,
            self.watch.pacing_min_ms,
            self.watch.pacing_max_ms,
            self.wallets.mnemonic_list.len(),
            self.wallets.accounts_per_wallet,
            self.storage.data_dir.display(),
            mask_secret(&self.telegram.bot_token),
        )
    }
}

fn mask_secret(value: &str) -> &'static str {
    if value.is_empty() {
        "(not set)"
    } else {
        "***"
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            watch: WatchConfig::default(),
            wallets: WalletsConfig::default(),
            storage: StorageConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.watch.poll_interval_ms, 5000);
        assert_eq!(config.watch.change_threshold, 1.0);
        assert_eq!(config.watch.dust_threshold, 1.0);
        assert_eq!(config.api.max_retries, 2);
        assert_eq!(config.api.retry_base_delay_ms, 500);
        assert_eq!(config.wallets.accounts_per_wallet, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[api]
api_key = "key"
secret_key = "secret"
passphrase = "pass"
project_id = "proj"

[watch]
poll_interval_ms = 10000
change_threshold = 2.5

[wallets]
mnemonic_list = ["abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"]
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.api_key, "key");
        assert_eq!(config.api.project_id, "proj");
        assert_eq!(config.watch.poll_interval_ms, 10000);
        assert_eq!(config.watch.change_threshold, 2.5);
        assert_eq!(config.watch.dust_threshold, 1.0);
        assert_eq!(config.wallets.mnemonic_list.len(), 1);
        assert!(config.require_api_credentials().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_pacing() {
        let mut config = Config::default();
        config.watch.pacing_min_ms = 2000;
        config.watch.pacing_max_ms = 1000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_credentials() {
        let config = Config::default();
        assert!(config.require_api_credentials().is_err());
    }

    #[test]
    fn test_masked_display_hides_secrets() {
        let mut config = Config::default();
        config.api.secret_key = "super-secret".into();
        config.telegram.bot_token = "123:abc".into();
        let shown = config.masked_display();
        assert!(!shown.contains("super-secret"));
        assert!(!shown.contains("123:abc"));
        assert!(shown.contains("***"));
    }

    #[test]
    fn test_mask_url() {
        assert_eq!(
            mask_url("https://api.example.com?key=secret"),
            "https://api.example.com?***"
        );
        assert_eq!(
            mask_url("https://api.example.com"),
            "https://api.example.com"
        );
    }
}
