//! Maps a user address to the child index used for their server identity.
//!
//! The mapping is `sha256(lowercase(address))[0..4]` read as a big-endian `u32`, reduced modulo
//! `2^31`. Every identity ever handed out depends on this exact recipe: changing the digest,
//! the byte order, or the normalization reassigns every user's derived server.

use sha2::{Digest, Sha256};

/// Upper bound (exclusive) of a derivation index, i.e. the first hardened BIP32 index.
pub const DERIVATION_INDEX_MODULUS: u32 = 1 << 31;

/// Computes the derivation index for `user_address`.
///
/// Accepts any string. Address format checks belong to
/// [`IdentityDerivationService`](crate::IdentityDerivationService).
pub fn derivation_index(user_address: &str) -> u32 {
    let digest = Sha256::digest(user_address.to_lowercase().as_bytes());
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);

    prefix % DERIVATION_INDEX_MODULUS
}
