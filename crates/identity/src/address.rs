//! Ethereum address generation utilities.
//!
//! Provides functions to turn a secp256k1 public key into an EIP-55 checksummed address.

use secp256k1::PublicKey;
use tiny_keccak::{Hasher, Keccak};

/// Computes the keccak-256 digest of `input`.
pub fn keccak256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut out = [0u8; 32];
    hasher.update(input);
    hasher.finalize(&mut out);
    out
}

/// Raw 20-byte Ethereum address of `pubkey`: the last 20 bytes of the keccak-256 digest of the
/// uncompressed key without its `0x04` tag.
pub fn address_bytes(pubkey: &PublicKey) -> [u8; 20] {
    let uncompressed = pubkey.serialize_uncompressed();
    let digest = keccak256(&uncompressed[1..]);

    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Generate the EIP-55 checksummed address of `pubkey`.
#[must_use]
pub fn ethereum_address(pubkey: &PublicKey) -> String {
    to_checksum_address(&address_bytes(pubkey))
}

/// Formats raw address bytes as a `0x`-prefixed EIP-55 checksummed string.
pub fn to_checksum_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}
