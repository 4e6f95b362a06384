//! Deterministic server identities for gateway users.
//!
//! Every user gets a dedicated server address and keypair derived from one shared root
//! mnemonic and the user's own public address. Nothing per-user is ever stored: the identity is
//! recomputed on each request.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use compute_gateway_identity::{IdentityDerivationService, RootSecret};
//!
//! let secret = Arc::new(RootSecret::new(mnemonic, "english"));
//! let service = IdentityDerivationService::with_bip44(secret);
//!
//! let identity = service.derive_user_server_address("0xabc...")?;
//! println!("{}", identity.keys.address);
//! ```
//!
//! # Derivation
//!
//! ```text
//! user address ──lowercase──sha256──first 4 bytes (BE) mod 2^31──▶ index
//! root mnemonic ──BIP39──▶ seed ──BIP32──▶ m/44'/60'/0'/0/index ──▶ keypair + EIP-55 address
//! ```

pub mod address;
pub mod engine;
pub mod index;
pub mod secret;
pub mod service;

// Internal module - paths are fixed for every identity ever issued.
mod paths;

pub use address::ethereum_address;
pub use engine::{
    Bip44EthereumEngine, DerivedKeys, KeyDerivationEngine, KeyDerivationError, MnemonicLanguage,
};
pub use index::{derivation_index, DERIVATION_INDEX_MODULUS};
pub use secret::{RootSecret, DEFAULT_MNEMONIC_LANGUAGE};
pub use service::{IdentityDerivationService, IdentityError, UserServerIdentity};
