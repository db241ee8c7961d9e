//! Core types for locally-held wallet material and remote asset snapshots

use serde::{Deserialize, Serialize};
use std::fmt;

/// chainIndex the remote API uses for Solana
pub const CHAIN_INDEX_SOLANA: &str = "501";
/// chainIndex for Ethereum mainnet
pub const CHAIN_INDEX_ETHEREUM: &str = "1";
/// chainIndex for BNB Chain
pub const CHAIN_INDEX_BNB: &str = "56";
/// chainIndex for Tron
pub const CHAIN_INDEX_TRON: &str = "195";
/// chainIndex for TON (reported by the API, never derived locally)
pub const CHAIN_INDEX_TON: &str = "396";

/// Chain family a key is derived for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Solana,
    Evm,
    Tron,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Solana, Chain::Evm, Chain::Tron];

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Solana => "solana",
            Chain::Evm => "evm",
            Chain::Tron => "tron",
        }
    }

    /// chainIndex values an address of this family is registered under
    pub fn chain_indices(&self) -> &'static [&'static str] {
        match self {
            Chain::Solana => &[CHAIN_INDEX_SOLANA],
            Chain::Evm => &[CHAIN_INDEX_ETHEREUM, CHAIN_INDEX_BNB],
            Chain::Tron => &[CHAIN_INDEX_TRON],
        }
    }

    /// EVM addresses are hex and compared case-insensitively; base58 ones are exact
    pub fn address_matches(&self, ours: &str, theirs: &str) -> bool {
        match self {
            Chain::Evm => ours.eq_ignore_ascii_case(theirs),
            Chain::Solana | Chain::Tron => ours == theirs,
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Human-readable name for a remote chainIndex
pub fn chain_name(chain_index: &str) -> Option<&'static str> {
    match chain_index {
        CHAIN_INDEX_SOLANA => Some("solana"),
        CHAIN_INDEX_ETHEREUM => Some("evm"),
        CHAIN_INDEX_BNB => Some("bnb"),
        CHAIN_INDEX_TRON => Some("tron"),
        CHAIN_INDEX_TON => Some("ton"),
        _ => None,
    }
}

/// One derived keypair. Pure function of (mnemonic, chain, index).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedKeyEntry {
    pub chain: Chain,
    pub address: String,
    pub private_key: String,
    pub public_key: String,
    pub derivation_index: u32,
}

/// All chain keys derived at one index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountBundle {
    pub index: u32,
    pub solana: DerivedKeyEntry,
    pub evm: DerivedKeyEntry,
    /// Absent for the primary (index 0) bundle
    #[serde(default)]
    pub tron: Option<DerivedKeyEntry>,
}

impl AccountBundle {
    /// Entries present in this bundle, in matching order
    pub fn entries(&self) -> impl Iterator<Item = &DerivedKeyEntry> {
        [Some(&self.solana), Some(&self.evm), self.tron.as_ref()]
            .into_iter()
            .flatten()
    }

    /// First entry whose address matches `address` under its chain's rule
    pub fn find_address(&self, address: &str) -> Option<&DerivedKeyEntry> {
        self.entries()
            .find(|entry| entry.chain.address_matches(&entry.address, address))
    }
}

/// A mnemonic with its derived bundles, optionally registered remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletAccount {
    pub mnemonic: String,
    #[serde(default)]
    pub accounts: Vec<AccountBundle>,
    /// Join key to remote balance data; assigned on registration
    #[serde(default, rename = "accountId", skip_serializing_if = "Option::is_none")]
    pub remote_account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_value: Option<String>,
}

impl WalletAccount {
    pub fn new(mnemonic: impl Into<String>) -> Self {
        Self {
            mnemonic: mnemonic.into(),
            accounts: Vec::new(),
            remote_account_id: None,
            total_value: None,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.remote_account_id
            .as_deref()
            .is_some_and(|id| !id.is_empty())
    }
}

/// Point-in-time token balance reported by the remote API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAsset {
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub balance: String,
    #[serde(default)]
    pub token_price: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub chain_index: String,
}

impl TokenAsset {
    /// balance x price; unparseable numbers count as zero
    pub fn token_value(&self) -> f64 {
        let balance = self.balance.trim().parse::<f64>().unwrap_or(0.0);
        let price = self.token_price.trim().parse::<f64>().unwrap_or(0.0);
        let value = balance * price;
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    pub fn chain_name(&self) -> &'static str {
        chain_name(&self.chain_index).unwrap_or("unknown")
    }
}

/// A token asset resolved to the private key controlling it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedTokenInfo {
    #[serde(flatten)]
    pub asset: TokenAsset,
    pub token_value: f64,
    pub private_key: String,
    pub mnemonic: String,
    /// Which derived entry matched
    pub chain: Chain,
    pub derivation_index: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(chain: Chain, address: &str) -> DerivedKeyEntry {
        DerivedKeyEntry {
            chain,
            address: address.to_string(),
            private_key: format!("pk-{}", address),
            public_key: String::new(),
            derivation_index: 1,
        }
    }

    #[test]
    fn test_chain_name() {
        assert_eq!(chain_name("501"), Some("solana"));
        assert_eq!(chain_name("1"), Some("evm"));
        assert_eq!(chain_name("56"), Some("bnb"));
        assert_eq!(chain_name("195"), Some("tron"));
        assert_eq!(chain_name("396"), Some("ton"));
        assert_eq!(chain_name("42161"), None);
    }

    #[test]
    fn test_address_matching_rules() {
        assert!(Chain::Evm.address_matches("0xAbCdEf", "0xabcdef"));
        assert!(!Chain::Tron.address_matches("TXyzAbc", "txyzabc"));
        assert!(!Chain::Solana.address_matches("HAgk14", "hagk14"));
        assert!(Chain::Solana.address_matches("HAgk14", "HAgk14"));
    }

    #[test]
    fn test_bundle_without_tron_never_matches_empty() {
        let bundle = AccountBundle {
            index: 0,
            solana: entry(Chain::Solana, "So1"),
            evm: entry(Chain::Evm, "0xAA"),
            tron: None,
        };
        assert_eq!(bundle.entries().count(), 2);
        assert!(bundle.find_address("").is_none());
        assert_eq!(bundle.find_address("0xaa").unwrap().chain, Chain::Evm);
    }

    #[test]
    fn test_token_value() {
        let asset = TokenAsset {
            symbol: "USDT".into(),
            balance: "2.5".into(),
            token_price: "0.4".into(),
            address: "x".into(),
            chain_index: "56".into(),
        };
        assert!((asset.token_value() - 1.0).abs() < 1e-12);
        assert_eq!(asset.chain_name(), "bnb");

        let broken = TokenAsset {
            balance: "n/a".into(),
            ..asset
        };
        assert_eq!(broken.token_value(), 0.0);
    }

    #[test]
    fn test_wallet_account_serde_uses_account_id() {
        let mut wallet = WalletAccount::new("word list");
        wallet.remote_account_id = Some("acc-1".into());
        let json = serde_json::to_value(&wallet).unwrap();
        assert_eq!(json["accountId"], "acc-1");

        let parsed: WalletAccount =
            serde_json::from_str(r#"{"mnemonic":"m","accounts":[],"accountId":""}"#).unwrap();
        assert!(!parsed.is_registered());
    }
}
