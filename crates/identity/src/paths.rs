//! BIP44 paths used for user server identities.
//!
//! ```text
//! Master Seed (BIP39, empty passphrase)
//! └── m/44'/60'/0'/0 ──────── Ethereum external chain, account 0
//!     └── m/44'/60'/0'/0/i ── server identity for the user whose derivation index is `i`
//! ```
//!
//! The leaf is a normal (non-hardened) child, which is why derivation indices are capped at
//! `2^31`.

use bitcoin::bip32::ChildNumber;

/// BIP44 purpose.
const BIP44_PURPOSE_IDX: ChildNumber = ChildNumber::Hardened { index: 44 };

/// SLIP-44 coin type for Ethereum.
const ETHEREUM_COIN_IDX: ChildNumber = ChildNumber::Hardened { index: 60 };

/// First account.
const ACCOUNT_IDX: ChildNumber = ChildNumber::Hardened { index: 0 };

/// External (receiving) chain.
const EXTERNAL_CHAIN_IDX: ChildNumber = ChildNumber::Normal { index: 0 };

/// Path from the master key to the parent of every user server key (`m/44'/60'/0'/0`).
pub(crate) const ETHEREUM_EXTERNAL_CHAIN_PATH: &[ChildNumber] = &[
    BIP44_PURPOSE_IDX,
    ETHEREUM_COIN_IDX,
    ACCOUNT_IDX,
    EXTERNAL_CHAIN_IDX,
];
