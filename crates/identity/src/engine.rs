//! Hierarchical-deterministic key derivation.
//!
//! [`KeyDerivationEngine`] is the seam between the identity service and the BIP32/39/44 math.
//! [`Bip44EthereumEngine`] is the production implementation: mnemonic to seed, seed to master
//! [`Xpriv`], then `m/44'/60'/0'/0/<index>` to an Ethereum keypair.

use std::{fmt, iter, str::FromStr};

use bip39::{Language, Mnemonic};
use bitcoin::{
    bip32::{self, ChildNumber, DerivationPath, Xpriv},
    NetworkKind,
};
use secp256k1::{PublicKey, SECP256K1};
use zeroize::Zeroizing;

use crate::{address::ethereum_address, paths::ETHEREUM_EXTERNAL_CHAIN_PATH};

/// Error type for key derivation operations.
///
/// None of the variants carry mnemonic words or key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyDerivationError {
    /// The configured wordlist language is not supported.
    #[error("unsupported mnemonic language: {0}")]
    UnsupportedLanguage(String),

    /// The mnemonic failed BIP39 validation.
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(#[from] bip39::Error),

    /// The child index does not fit a normal (non-hardened) BIP32 index.
    #[error("derivation index {0} is out of range")]
    IndexOutOfRange(u32),

    /// BIP32 derivation failed.
    #[error("BIP32 derivation error: {0}")]
    Bip32(#[from] bip32::Error),
}

/// BIP39 wordlists accepted for the root mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicLanguage {
    /// English.
    English,
    /// Simplified Chinese.
    ChineseSimplified,
    /// Traditional Chinese.
    ChineseTraditional,
    /// Czech.
    Czech,
    /// French.
    French,
    /// Italian.
    Italian,
    /// Japanese.
    Japanese,
    /// Korean.
    Korean,
    /// Portuguese.
    Portuguese,
    /// Spanish.
    Spanish,
}

impl FromStr for MnemonicLanguage {
    type Err = KeyDerivationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "english" => Ok(Self::English),
            "chinese_simplified" => Ok(Self::ChineseSimplified),
            "chinese_traditional" => Ok(Self::ChineseTraditional),
            "czech" => Ok(Self::Czech),
            "french" => Ok(Self::French),
            "italian" => Ok(Self::Italian),
            "japanese" => Ok(Self::Japanese),
            "korean" => Ok(Self::Korean),
            "portuguese" => Ok(Self::Portuguese),
            "spanish" => Ok(Self::Spanish),
            _ => Err(KeyDerivationError::UnsupportedLanguage(s.to_string())),
        }
    }
}

impl From<MnemonicLanguage> for Language {
    fn from(language: MnemonicLanguage) -> Self {
        match language {
            MnemonicLanguage::English => Language::English,
            MnemonicLanguage::ChineseSimplified => Language::SimplifiedChinese,
            MnemonicLanguage::ChineseTraditional => Language::TraditionalChinese,
            MnemonicLanguage::Czech => Language::Czech,
            MnemonicLanguage::French => Language::French,
            MnemonicLanguage::Italian => Language::Italian,
            MnemonicLanguage::Japanese => Language::Japanese,
            MnemonicLanguage::Korean => Language::Korean,
            MnemonicLanguage::Portuguese => Language::Portuguese,
            MnemonicLanguage::Spanish => Language::Spanish,
        }
    }
}

/// Keys derived for a single child index.
///
/// The private key is zeroized on drop and never shown by [`Debug`](fmt::Debug).
#[derive(Clone, PartialEq, Eq)]
pub struct DerivedKeys {
    /// EIP-55 checksummed address.
    pub address: String,

    /// Uncompressed SEC1 public key (65 bytes, `04` tag included), lower-case hex.
    pub public_key_hex: String,

    /// 32-byte private scalar, lower-case hex.
    pub private_key_hex: Zeroizing<String>,
}

impl fmt::Debug for DerivedKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeys")
            .field("address", &self.address)
            .field("public_key_hex", &self.public_key_hex)
            .field("private_key_hex", &"<redacted>")
            .finish()
    }
}

/// Derives a keypair from a root mnemonic and a child index.
pub trait KeyDerivationEngine: Send + Sync {
    /// Derives the keys at child `index` of the mnemonic's hierarchy.
    fn derive(
        &self,
        mnemonic: &str,
        index: u32,
        language: &str,
    ) -> Result<DerivedKeys, KeyDerivationError>;
}

/// BIP44 Ethereum derivation (`m/44'/60'/0'/0/<index>`) over secp256k1.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bip44EthereumEngine;

impl KeyDerivationEngine for Bip44EthereumEngine {
    fn derive(
        &self,
        mnemonic: &str,
        index: u32,
        language: &str,
    ) -> Result<DerivedKeys, KeyDerivationError> {
        let language = MnemonicLanguage::from_str(language)?;
        let child = ChildNumber::from_normal_idx(index)
            .map_err(|_| KeyDerivationError::IndexOutOfRange(index))?;

        let mnemonic = Mnemonic::parse_in(language.into(), mnemonic)?;
        let seed = Zeroizing::new(mnemonic.to_seed(""));

        let mut master = Xpriv::new_master(NetworkKind::Main, &seed[..])?;
        let path: DerivationPath = ETHEREUM_EXTERNAL_CHAIN_PATH
            .iter()
            .copied()
            .chain(iter::once(child))
            .collect::<Vec<_>>()
            .into();
        let derived = master.derive_priv(SECP256K1, &path);
        // NOTE: `SecretKey::non_secure_erase` writes `1`s to the memory.
        master.private_key.non_secure_erase();
        let mut leaf = derived?;

        let public_key = PublicKey::from_secret_key(SECP256K1, &leaf.private_key);
        let secret_bytes = Zeroizing::new(leaf.private_key.secret_bytes());
        leaf.private_key.non_secure_erase();

        Ok(DerivedKeys {
            address: ethereum_address(&public_key),
            public_key_hex: hex::encode(public_key.serialize_uncompressed()),
            private_key_hex: Zeroizing::new(hex::encode(&secret_bytes[..])),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RootSecret;

    const ABANDON_MNEMONIC: &str = "abandon abandon abandon abandon abandon abandon abandon \
                                    abandon abandon abandon abandon about";

    fn derive_test(index: u32) -> DerivedKeys {
        let secret = RootSecret::well_known_test();
        Bip44EthereumEngine
            .derive(secret.mnemonic(), index, secret.language())
            .expect("test mnemonic derives")
    }

    #[test]
    fn matches_reference_wallet_vector() {
        // First account of the canonical `abandon ... about` wallet, as shown by every
        // BIP44-compliant Ethereum wallet.
        let keys = Bip44EthereumEngine
            .derive(ABANDON_MNEMONIC, 0, "english")
            .unwrap();

        assert_eq!(keys.address, "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
        assert_eq!(
            keys.private_key_hex.as_str(),
            "1ab42cc412b618bdea3a599e3c9bae199ebf030895b039e9db1e30dafb12b727"
        );
        assert_eq!(keys.public_key_hex.len(), 130);
        assert!(keys.public_key_hex.starts_with("04"));
    }

    #[test]
    fn matches_test_secret_vector() {
        let keys = derive_test(0);

        assert_eq!(keys.address, "0xc7e0dfDB844B82D61b11b05aC7A949640773797E");
        assert_eq!(
            keys.private_key_hex.as_str(),
            "904548b24c90f5e361607709be6ad692b2659c7eee636207218eb0f959588827"
        );
        assert_eq!(
            keys.public_key_hex,
            "04b3e3b2d92cc62c6aef1a067101edb9b10f8007d7cae9c5a621b9354b50284042f53cb25f3e62d49df8e48d10da5e835a4edbc7a7e913a885e5bc8a3911f2dde9"
        );
    }

    #[test]
    fn distinct_indices_give_distinct_keys() {
        let a = derive_test(1);
        let b = derive_test(2);

        assert_ne!(a.address, b.address);
        assert_ne!(a.private_key_hex, b.private_key_hex);
    }

    #[test]
    fn public_key_matches_address() {
        let keys = derive_test(7);
        let raw = hex::decode(&keys.public_key_hex).unwrap();
        let pubkey = PublicKey::from_slice(&raw).unwrap();

        assert_eq!(ethereum_address(&pubkey), keys.address);
    }

    #[test]
    fn rejects_hardened_index() {
        let secret = RootSecret::well_known_test();
        let err = Bip44EthereumEngine
            .derive(secret.mnemonic(), 1 << 31, secret.language())
            .unwrap_err();

        assert!(matches!(err, KeyDerivationError::IndexOutOfRange(i) if i == 1 << 31));
    }

    #[test]
    fn rejects_bad_checksum() {
        let err = Bip44EthereumEngine
            .derive(
                "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon \
                 abandon abandon",
                0,
                "english",
            )
            .unwrap_err();

        assert!(matches!(err, KeyDerivationError::InvalidMnemonic(_)));
    }

    #[test]
    fn rejects_unknown_language() {
        let secret = RootSecret::well_known_test();
        let err = Bip44EthereumEngine
            .derive(secret.mnemonic(), 0, "klingon")
            .unwrap_err();

        assert!(matches!(err, KeyDerivationError::UnsupportedLanguage(l) if l == "klingon"));
    }

    #[test]
    fn language_names_are_case_insensitive() {
        assert_eq!(
            "English".parse::<MnemonicLanguage>().unwrap(),
            MnemonicLanguage::English
        );
        assert_eq!(
            "CHINESE_SIMPLIFIED".parse::<MnemonicLanguage>().unwrap(),
            MnemonicLanguage::ChineseSimplified
        );
        assert_eq!(
            " Portuguese ".parse::<MnemonicLanguage>().unwrap(),
            MnemonicLanguage::Portuguese
        );
        assert_eq!(
            Language::from(MnemonicLanguage::Portuguese),
            Language::Portuguese
        );
    }

    #[test]
    fn debug_redacts_private_key() {
        let keys = derive_test(0);
        let rendered = format!("{keys:?}");

        assert!(!rendered.contains(keys.private_key_hex.as_str()));
        assert!(rendered.contains(&keys.address));
    }
}
