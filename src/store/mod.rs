//! Persistence for wallet material, last-seen balances and notification recipients
//!
//! Every mutating call is durable on disk before it returns. The watch loop is
//! the only writer of balances; provisioning is the only writer of accounts.

mod json;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::wallet::WalletAccount;

pub use json::{JsonAccountStore, JsonBalanceStore, JsonRecipientStore};

/// remoteAccountId → last observed total value
pub type BalanceMap = BTreeMap<String, String>;

/// Wallet records keyed by mnemonic
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn all(&self) -> Result<Vec<WalletAccount>>;

    /// Add a new wallet; fails if its mnemonic is already stored
    async fn append(&self, wallet: WalletAccount) -> Result<()>;

    /// Assign (or with `None`, drop) the remote id of the wallet with `mnemonic`.
    /// Fails if another wallet already holds that id.
    async fn set_remote_account_id(&self, mnemonic: &str, account_id: Option<String>)
        -> Result<()>;

    async fn clear_remote_account_ids(&self) -> Result<()>;
}

/// Last-seen balances keyed by remote account id
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn all(&self) -> Result<BalanceMap>;

    async fn set(&self, account_id: &str, value: &str) -> Result<()>;

    async fn clear(&self) -> Result<()>;
}

/// A Telegram chat that receives notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecipient {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[async_trait]
pub trait RecipientStore: Send + Sync {
    async fn all(&self) -> Result<Vec<ChatRecipient>>;

    /// Returns false when a recipient with the same id is already stored
    async fn add(&self, recipient: ChatRecipient) -> Result<bool>;
}
