//! Wallet material module
//!
//! Offline key derivation and matching of remote asset snapshots against it.
//!
//! # Architecture
//!
//! ```text
//! mnemonic → derive (solana / evm / tron) → WalletAccount bundles
//!                                                  ↓
//!                    TokenAsset[] → AccountMatcher → AssetMatch[]
//! ```

pub mod derive;
pub mod matcher;
pub mod types;

pub use derive::{derive, derive_bundle, derive_wallet, Mnemonic};
pub use matcher::{AccountMatcher, AssetMatch};
pub use types::{
    chain_name, AccountBundle, Chain, DerivedKeyEntry, MatchedTokenInfo, TokenAsset,
    WalletAccount,
};
