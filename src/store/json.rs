//! JSON-file implementations of the stores

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use super::{AccountStore, BalanceMap, BalanceStore, ChatRecipient, RecipientStore};
use crate::error::{Error, Result};
use crate::wallet::WalletAccount;

/// A whole JSON document cached in memory and rewritten on every update
struct JsonFile<T> {
    path: PathBuf,
    data: RwLock<T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync,
{
    /// Load `path`, starting empty when it does not exist yet
    async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?;
            if text.trim().is_empty() {
                T::default()
            } else {
                serde_json::from_str(&text)
                    .map_err(|e| Error::Store(format!("{}: {}", path.display(), e)))?
            }
        } else {
            T::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    async fn read(&self) -> T {
        self.data.read().await.clone()
    }

    /// Apply `f` to a copy, flush it, then publish it. A failed write leaves
    /// the in-memory state untouched.
    async fn update<R>(&self, f: impl FnOnce(&mut T) -> Result<R> + Send) -> Result<R> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let result = f(&mut next)?;
        self.flush(&next).await?;
        *guard = next;
        Ok(result)
    }

    async fn flush(&self, data: &T) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Store(format!("{}: {}", parent.display(), e)))?;
        }

        let text = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| Error::Store(format!("{}: {}", self.path.display(), e)))?;

        debug!("Flushed {}", self.path.display());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountsDocument {
    #[serde(default)]
    accounts: Vec<WalletAccount>,
}

/// `accounts.json`
pub struct JsonAccountStore {
    file: JsonFile<AccountsDocument>,
}

impl JsonAccountStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path).await?,
        })
    }
}

#[async_trait]
impl AccountStore for JsonAccountStore {
    async fn all(&self) -> Result<Vec<WalletAccount>> {
        Ok(self.file.read().await.accounts)
    }

    async fn append(&self, wallet: WalletAccount) -> Result<()> {
        self.file
            .update(|doc| {
                if doc.accounts.iter().any(|w| w.mnemonic == wallet.mnemonic) {
                    return Err(Error::Store("wallet already stored".into()));
                }
                doc.accounts.push(wallet);
                Ok(())
            })
            .await
    }

    async fn set_remote_account_id(
        &self,
        mnemonic: &str,
        account_id: Option<String>,
    ) -> Result<()> {
        self.file
            .update(|doc| {
                if let Some(id) = account_id.as_deref() {
                    let taken = doc.accounts.iter().any(|w| {
                        w.mnemonic != mnemonic && w.remote_account_id.as_deref() == Some(id)
                    });
                    if taken {
                        return Err(Error::Store(format!(
                            "remote account id {} already assigned",
                            id
                        )));
                    }
                }

                let wallet = doc
                    .accounts
                    .iter_mut()
                    .find(|w| w.mnemonic == mnemonic)
                    .ok_or_else(|| Error::Store("wallet not found".into()))?;
                wallet.remote_account_id = account_id;
                Ok(())
            })
            .await
    }

    async fn clear_remote_account_ids(&self) -> Result<()> {
        self.file
            .update(|doc| {
                for wallet in &mut doc.accounts {
                    wallet.remote_account_id = None;
                }
                Ok(())
            })
            .await
    }
}

/// `balances.json`
pub struct JsonBalanceStore {
    file: JsonFile<BalanceMap>,
}

impl JsonBalanceStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path).await?,
        })
    }
}

#[async_trait]
impl BalanceStore for JsonBalanceStore {
    async fn all(&self) -> Result<BalanceMap> {
        Ok(self.file.read().await)
    }

    async fn set(&self, account_id: &str, value: &str) -> Result<()> {
        self.file
            .update(|balances| {
                balances.insert(account_id.to_string(), value.to_string());
                Ok(())
            })
            .await
    }

    async fn clear(&self) -> Result<()> {
        self.file
            .update(|balances| {
                balances.clear();
                Ok(())
            })
            .await
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ChatsDocument {
    #[serde(default)]
    users: Vec<ChatRecipient>,
}

/// `chats.json`
pub struct JsonRecipientStore {
    file: JsonFile<ChatsDocument>,
}

impl JsonRecipientStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: JsonFile::open(path).await?,
        })
    }
}

#[async_trait]
impl RecipientStore for JsonRecipientStore {
    async fn all(&self) -> Result<Vec<ChatRecipient>> {
        Ok(self.file.read().await.users)
    }

    async fn add(&self, recipient: ChatRecipient) -> Result<bool> {
        if self.file.read().await.users.iter().any(|u| u.id == recipient.id) {
            return Ok(false);
        }
        self.file
            .update(|doc| {
                if doc.users.iter().any(|u| u.id == recipient.id) {
                    return Ok(false);
                }
                doc.users.push(recipient);
                Ok(true)
            })
            .await
    }
}
