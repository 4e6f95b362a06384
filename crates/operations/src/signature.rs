//! Request signature validation.
//!
//! Callers sign the exact request JSON with Ethereum's `personal_sign` (EIP-191). The gateway
//! recovers the signer from the signature and checks it against an allowlist.

use std::collections::HashSet;

use async_trait::async_trait;
use compute_gateway_identity::address::{address_bytes, keccak256, to_checksum_address};
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SECP256K1,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix of every EIP-191 `personal_sign` message.
const PERSONAL_MESSAGE_PREFIX: &[u8] = b"\x19Ethereum Signed Message:\n";

/// Length of an `r || s || v` signature.
const SIGNATURE_LEN: usize = 65;

/// Decides whether a signature authenticates a payload.
#[async_trait]
pub trait SignatureValidator: Send + Sync {
    /// Returns `true` iff `signature` is valid over `payload` for an accepted signer.
    async fn verify(&self, payload: &str, signature: &str) -> bool;
}

/// Reasons a signature cannot be turned into a signer address.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// Not hex.
    #[error("signature is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Wrong number of bytes.
    #[error("signature must be {SIGNATURE_LEN} bytes, got {0}")]
    InvalidLength(usize),

    /// The `v` byte is none of 0, 1, 27, 28.
    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    /// secp256k1 refused the signature.
    #[error("secp256k1: {0}")]
    Secp(#[from] secp256k1::Error),
}

/// Hashes `message` the way `personal_sign` does before signing.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut buf = Vec::with_capacity(PERSONAL_MESSAGE_PREFIX.len() + 20 + message.len());
    buf.extend_from_slice(PERSONAL_MESSAGE_PREFIX);
    buf.extend_from_slice(message.len().to_string().as_bytes());
    buf.extend_from_slice(message);

    keccak256(&buf)
}

/// Recovers the address that produced `signature` over `payload`.
///
/// `signature` is hex (with or without `0x`) of `r || s || v`.
pub fn recover_signer(payload: &str, signature: &str) -> Result<[u8; 20], SignatureError> {
    let raw = hex::decode(signature.strip_prefix("0x").unwrap_or(signature))?;
    if raw.len() != SIGNATURE_LEN {
        return Err(SignatureError::InvalidLength(raw.len()));
    }

    let v = raw[64];
    let recovery_id = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };
    let recovery_id = RecoveryId::from_i32(i32::from(recovery_id))?;
    let signature = RecoverableSignature::from_compact(&raw[..64], recovery_id)?;

    let message = Message::from_digest(personal_message_hash(payload.as_bytes()));
    let pubkey = SECP256K1.recover_ecdsa(&message, &signature)?;

    Ok(address_bytes(&pubkey))
}

/// Parses a `0x`-prefixed 20-byte hex address, in any letter case.
pub fn parse_address(address: &str) -> Result<[u8; 20], SignatureError> {
    let raw = hex::decode(address.strip_prefix("0x").unwrap_or(address))?;
    raw.as_slice()
        .try_into()
        .map_err(|_| SignatureError::InvalidLength(raw.len()))
}

/// [`SignatureValidator`] for EIP-191 `personal_sign` signatures.
#[derive(Debug, Clone, Default)]
pub struct PersonalSignValidator {
    /// Accepted signers. Empty means every recoverable signer is accepted.
    allowed_signers: HashSet<[u8; 20]>,
}

impl PersonalSignValidator {
    /// Accepts any signer whose signature recovers.
    pub fn accept_any() -> Self {
        Self::default()
    }

    /// Accepts only the given signers.
    pub fn with_allowed_signers(signers: impl IntoIterator<Item = [u8; 20]>) -> Self {
        Self {
            allowed_signers: signers.into_iter().collect(),
        }
    }

    /// Accepts only the given `0x` hex addresses.
    pub fn from_addresses<S: AsRef<str>>(
        addresses: impl IntoIterator<Item = S>,
    ) -> Result<Self, SignatureError> {
        let signers = addresses
            .into_iter()
            .map(|a| parse_address(a.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::with_allowed_signers(signers))
    }

    fn is_allowed(&self, signer: &[u8; 20]) -> bool {
        self.allowed_signers.is_empty() || self.allowed_signers.contains(signer)
    }
}

#[async_trait]
impl SignatureValidator for PersonalSignValidator {
    async fn verify(&self, payload: &str, signature: &str) -> bool {
        let signer = match recover_signer(payload, signature) {
            Ok(signer) => signer,
            Err(e) => {
                debug!(%e, "could not recover request signer");
                return false;
            }
        };

        let signer_address = to_checksum_address(&signer);
        if self.is_allowed(&signer) {
            debug!(%signer_address, "recovered request signer");
            true
        } else {
            warn!(%signer_address, "request signed by a signer outside the allowlist");
            false
        }
    }
}
