//! Deterministic key derivation from a BIP39 mnemonic
//!
//! Paths per chain:
//! - solana: `m/44'/501'/{index}'/0'` (SLIP-0010 ed25519, all hardened)
//! - evm:    `m/44'/60'/0'/0/{index}` (BIP32 secp256k1)
//! - tron:   `m/44'/195'/0'/0/{index}` (BIP32 secp256k1)
//!
//! Index 0 is the primary (multisig) bundle and carries no tron key.

use bip39::{Language, Mnemonic as Bip39Mnemonic};
use coins_bip32::path::DerivationPath;
use coins_bip32::prelude::*;
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use sha2::{Digest as _, Sha256, Sha512};
use sha3::Keccak256;

use crate::error::{Error, Result};

use super::types::{AccountBundle, Chain, DerivedKeyEntry, WalletAccount};

const HARDENED_OFFSET: u32 = 0x8000_0000;
const TRON_ADDRESS_PREFIX: u8 = 0x41;

/// Index whose bundle skips tron derivation
pub const PRIMARY_INDEX: u32 = 0;

/// A checksum-validated seed phrase
#[derive(Clone)]
pub struct Mnemonic {
    inner: Bip39Mnemonic,
}

impl Mnemonic {
    /// Parse and validate an English BIP39 phrase
    pub fn parse(phrase: &str) -> Result<Self> {
        let normalized = phrase.split_whitespace().collect::<Vec<_>>().join(" ");
        let inner = Bip39Mnemonic::parse_in(Language::English, &normalized)
            .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;
        Ok(Self { inner })
    }

    pub fn phrase(&self) -> String {
        self.inner.to_string()
    }

    fn seed(&self) -> [u8; 64] {
        self.inner.to_seed("")
    }
}

impl std::fmt::Debug for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Mnemonic(***)")
    }
}

/// Derive the key for `chain` at `index`.
///
/// Fails with `InvalidMnemonic` when the phrase does not validate.
pub fn derive(mnemonic: &str, index: u32, chain: Chain) -> Result<DerivedKeyEntry> {
    let mnemonic = Mnemonic::parse(mnemonic)?;
    derive_with(&mnemonic, index, chain)
}

/// Derive from an already-validated mnemonic
pub fn derive_with(mnemonic: &Mnemonic, index: u32, chain: Chain) -> Result<DerivedKeyEntry> {
    let seed = mnemonic.seed();
    match chain {
        Chain::Solana => derive_solana(&seed, index),
        Chain::Evm => derive_evm(&seed, index),
        Chain::Tron => derive_tron(&seed, index),
    }
}

/// Derive the solana/evm/tron bundle at `index` (tron omitted for the primary index)
pub fn derive_bundle(mnemonic: &Mnemonic, index: u32) -> Result<AccountBundle> {
    let seed = mnemonic.seed();
    let solana = derive_solana(&seed, index)?;
    let evm = derive_evm(&seed, index)?;
    let tron = if index == PRIMARY_INDEX {
        None
    } else {
        Some(derive_tron(&seed, index)?)
    };

    Ok(AccountBundle {
        index,
        solana,
        evm,
        tron,
    })
}

/// Build an unregistered wallet with bundles `0..count`
pub fn derive_wallet(phrase: &str, count: u32) -> Result<WalletAccount> {
    let mnemonic = Mnemonic::parse(phrase)?;
    let mut wallet = WalletAccount::new(mnemonic.phrase());
    for index in 0..count {
        wallet.accounts.push(derive_bundle(&mnemonic, index)?);
    }
    Ok(wallet)
}

fn derive_solana(seed: &[u8], index: u32) -> Result<DerivedKeyEntry> {
    let secret = slip10_ed25519(seed, &[44, 501, index, 0])?;
    let signing_key = Ed25519SigningKey::from_bytes(&secret);
    let public_key = bs58::encode(signing_key.verifying_key().to_bytes()).into_string();

    Ok(DerivedKeyEntry {
        chain: Chain::Solana,
        address: public_key.clone(),
        // 64-byte secret||public keypair, the format wallets import
        private_key: bs58::encode(signing_key.to_keypair_bytes()).into_string(),
        public_key,
        derivation_index: index,
    })
}

fn derive_evm(seed: &[u8], index: u32) -> Result<DerivedKeyEntry> {
    let signing_key = derive_secp256k1(seed, &format!("m/44'/60'/0'/0/{}", index))?;
    let address = to_checksum_address(&keccak_address(&signing_key));

    Ok(DerivedKeyEntry {
        chain: Chain::Evm,
        address,
        private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
        public_key: compressed_public_key_hex(&signing_key),
        derivation_index: index,
    })
}

fn derive_tron(seed: &[u8], index: u32) -> Result<DerivedKeyEntry> {
    let signing_key = derive_secp256k1(seed, &format!("m/44'/195'/0'/0/{}", index))?;
    let address = tron_address(&keccak_address(&signing_key));

    Ok(DerivedKeyEntry {
        chain: Chain::Tron,
        address,
        private_key: format!("0x{}", hex::encode(signing_key.to_bytes())),
        public_key: compressed_public_key_hex(&signing_key),
        derivation_index: index,
    })
}

/// SLIP-0010 ed25519: HMAC-SHA512 chain with every segment hardened
fn slip10_ed25519(seed: &[u8], path: &[u32]) -> Result<[u8; 32]> {
    type HmacSha512 = Hmac<Sha512>;

    let mut mac = <HmacSha512 as Mac>::new_from_slice(b"ed25519 seed")
        .map_err(|e| Error::Derivation(format!("HMAC initialization failed: {}", e)))?;
    mac.update(seed);
    let result = mac.finalize().into_bytes();

    let mut key = [0u8; 32];
    let mut chain_code = [0u8; 32];
    key.copy_from_slice(&result[..32]);
    chain_code.copy_from_slice(&result[32..]);

    for &segment in path {
        let mut mac = <HmacSha512 as Mac>::new_from_slice(&chain_code)
            .map_err(|e| Error::Derivation(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&[0x00]);
        mac.update(&key);
        mac.update(&(segment | HARDENED_OFFSET).to_be_bytes());

        let result = mac.finalize().into_bytes();
        key.copy_from_slice(&result[..32]);
        chain_code.copy_from_slice(&result[32..]);
    }

    Ok(key)
}

fn derive_secp256k1(seed: &[u8], path: &str) -> Result<SigningKey> {
    let derivation_path = path
        .parse::<DerivationPath>()
        .map_err(|e| Error::Derivation(format!("Invalid derivation path {}: {}", path, e)))?;

    let master_key = XPriv::root_from_seed(seed, None)
        .map_err(|e| Error::Derivation(format!("Failed to derive master key: {}", e)))?;

    let derived_key = master_key
        .derive_path(&derivation_path)
        .map_err(|e| Error::Derivation(format!("No private key at {}: {}", path, e)))?;

    let signing_key: &SigningKey = derived_key.as_ref();
    Ok(signing_key.clone())
}

/// Last 20 bytes of keccak256 over the uncompressed public key (sans 0x04)
fn keccak_address(signing_key: &SigningKey) -> [u8; 20] {
    let uncompressed = signing_key.verifying_key().to_encoded_point(false);
    let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

fn compressed_public_key_hex(signing_key: &SigningKey) -> String {
    let compressed = signing_key.verifying_key().to_encoded_point(true);
    format!("0x{}", hex::encode(compressed.as_bytes()))
}

/// EIP-55 mixed-case checksum encoding
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = Keccak256::digest(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// base58check(0x41 || address), checksum = first 4 bytes of sha256(sha256(payload))
pub fn tron_address(address: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(address);

    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);

    bs58::encode(payload).into_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_invalid_mnemonic_rejected() {
        let bad = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon";
        match derive(bad, 1, Chain::Evm) {
            Err(Error::InvalidMnemonic(_)) => {}
            other => panic!("expected InvalidMnemonic, got {:?}", other),
        }
        assert!(matches!(
            derive("not a mnemonic", 0, Chain::Solana),
            Err(Error::InvalidMnemonic(_))
        ));
    }

    #[test]
    fn test_evm_known_vector() {
        let entry = derive(TEST_MNEMONIC, 0, Chain::Evm).unwrap();
        assert_eq!(entry.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(entry.chain, Chain::Evm);
        assert_eq!(entry.derivation_index, 0);
        assert!(entry.private_key.starts_with("0x"));
        assert_eq!(entry.private_key.len(), 66);
        assert_eq!(entry.public_key.len(), 2 + 66);
    }

    #[test]
    fn test_evm_second_index_vector() {
        let entry = derive(TEST_MNEMONIC, 1, Chain::Evm).unwrap();
        assert_eq!(entry.address, "0x6Fac4D18c912343BF86fa7049364Dd4E424Ab9C0");
    }

    #[test]
    fn test_solana_known_vectors() {
        let first = derive(TEST_MNEMONIC, 0, Chain::Solana).unwrap();
        assert_eq!(first.address, "HAgk14JpMQLgt6rVgv7cBQFJWFto5Dqxi472uT3DKpqk");
        let second = derive(TEST_MNEMONIC, 1, Chain::Solana).unwrap();
        assert_eq!(second.address, "Hh8QwFUA6MtVu1qAoq12ucvFHNwCcVTV7hpWjeY1Hztb");
    }

    #[test]
    fn test_tron_known_vectors() {
        let first = derive(TEST_MNEMONIC, 0, Chain::Tron).unwrap();
        assert_eq!(first.address, "TUEZSdKsoDHQMeZwihtdoBiN46zxhGWYdH");
        let second = derive(TEST_MNEMONIC, 1, Chain::Tron).unwrap();
        assert_eq!(second.address, "TSeJkUh4Qv67VNFwY8LaAxERygNdy6NQZK");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        for chain in Chain::ALL {
            for index in [0, 1, 3] {
                let a = derive(TEST_MNEMONIC, index, chain).unwrap();
                let b = derive(TEST_MNEMONIC, index, chain).unwrap();
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn test_whitespace_is_normalized() {
        let spaced = format!("  {}  ", TEST_MNEMONIC.replace(' ', "   "));
        assert_eq!(
            derive(&spaced, 2, Chain::Solana).unwrap(),
            derive(TEST_MNEMONIC, 2, Chain::Solana).unwrap()
        );
    }

    #[test]
    fn test_indices_produce_distinct_addresses() {
        let a = derive(TEST_MNEMONIC, 1, Chain::Evm).unwrap();
        let b = derive(TEST_MNEMONIC, 2, Chain::Evm).unwrap();
        assert_ne!(a.address, b.address);

        let s1 = derive(TEST_MNEMONIC, 1, Chain::Solana).unwrap();
        let s2 = derive(TEST_MNEMONIC, 2, Chain::Solana).unwrap();
        assert_ne!(s1.address, s2.address);
    }

    #[test]
    fn test_solana_keypair_layout() {
        let entry = derive(TEST_MNEMONIC, 1, Chain::Solana).unwrap();
        let keypair = bs58::decode(&entry.private_key).into_vec().unwrap();
        assert_eq!(keypair.len(), 64);

        let public = bs58::decode(&entry.address).into_vec().unwrap();
        assert_eq!(public.len(), 32);
        assert_eq!(&keypair[32..], public.as_slice());
        assert_eq!(entry.public_key, entry.address);

        let secret: [u8; 32] = keypair[..32].try_into().unwrap();
        let signing = Ed25519SigningKey::from_bytes(&secret);
        assert_eq!(signing.verifying_key().to_bytes().as_slice(), public.as_slice());
    }

    #[test]
    fn test_tron_address_structure() {
        let entry = derive(TEST_MNEMONIC, 1, Chain::Tron).unwrap();
        assert!(entry.address.starts_with('T'));
        assert_eq!(entry.address.len(), 34);

        let raw = bs58::decode(&entry.address).into_vec().unwrap();
        assert_eq!(raw.len(), 25);
        assert_eq!(raw[0], TRON_ADDRESS_PREFIX);

        let checksum = Sha256::digest(Sha256::digest(&raw[..21]));
        assert_eq!(&raw[21..], &checksum[..4]);

        // payload is keccak(uncompressed pubkey)[12..] of the reported public key
        let compressed = hex::decode(entry.public_key.trim_start_matches("0x")).unwrap();
        let verifying = k256::ecdsa::VerifyingKey::from_sec1_bytes(&compressed).unwrap();
        let uncompressed = verifying.to_encoded_point(false);
        let hash = Keccak256::digest(&uncompressed.as_bytes()[1..]);
        assert_eq!(&raw[1..21], &hash[12..]);
    }

    #[test]
    fn test_tron_and_evm_use_different_paths() {
        let evm = derive(TEST_MNEMONIC, 1, Chain::Evm).unwrap();
        let tron = derive(TEST_MNEMONIC, 1, Chain::Tron).unwrap();
        assert_ne!(evm.private_key, tron.private_key);
    }

    #[test]
    fn test_checksum_address_eip55_vector() {
        let raw: [u8; 20] = hex::decode("5aaeb6053f3e94c9b9a09f33669435e7ef1beaed")
            .unwrap()
            .try_into()
            .unwrap();
        assert_eq!(
            to_checksum_address(&raw),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn test_primary_bundle_omits_tron() {
        let mnemonic = Mnemonic::parse(TEST_MNEMONIC).unwrap();

        let primary = derive_bundle(&mnemonic, 0).unwrap();
        assert!(primary.tron.is_none());
        assert!(!primary.solana.address.is_empty());
        assert!(!primary.evm.address.is_empty());

        for index in 1..4 {
            let bundle = derive_bundle(&mnemonic, index).unwrap();
            let tron = bundle.tron.as_ref().unwrap();
            assert!(!tron.address.is_empty());
            assert_eq!(tron.derivation_index, index);
            assert_eq!(bundle.solana.derivation_index, index);
            assert_eq!(bundle.evm.derivation_index, index);
        }
    }

    #[test]
    fn test_derive_wallet_builds_ordered_bundles() {
        let wallet = derive_wallet(TEST_MNEMONIC, 4).unwrap();
        assert_eq!(wallet.mnemonic, TEST_MNEMONIC);
        assert_eq!(
            wallet.accounts.iter().map(|b| b.index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        assert!(wallet.remote_account_id.is_none());
    }

    #[test]
    fn test_mnemonic_debug_is_redacted() {
        let mnemonic = Mnemonic::parse(TEST_MNEMONIC).unwrap();
        assert_eq!(format!("{:?}", mnemonic), "Mnemonic(***)");
    }
}
