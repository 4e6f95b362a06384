//! Derivation of a user's dedicated server identity.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    engine::{Bip44EthereumEngine, DerivedKeys, KeyDerivationEngine, KeyDerivationError},
    index::derivation_index,
    secret::RootSecret,
};

/// Prefix every accepted user address must carry.
pub const ADDRESS_PREFIX: &str = "0x";

/// Errors returned by [`IdentityDerivationService`].
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    /// The user address was rejected before any derivation was attempted.
    #[error("invalid user address: {0}")]
    InvalidInput(String),

    /// The key derivation engine failed.
    #[error("address derivation failed: {0}")]
    DerivationFailed(#[from] KeyDerivationError),
}

/// A user's server identity, recomputed on every request and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserServerIdentity {
    /// The address the identity was derived for, as supplied by the caller.
    pub user_address: String,

    /// Child index derived from [`Self::user_address`].
    pub derivation_index: u32,

    /// The derived keys. `Debug` redacts the private key.
    pub keys: DerivedKeys,
}

/// Derives per-user server identities from a shared [`RootSecret`].
#[derive(Debug, Clone)]
pub struct IdentityDerivationService<E = Bip44EthereumEngine> {
    /// Root secret shared with the rest of the process.
    secret: Arc<RootSecret>,

    /// Engine performing the hierarchical-deterministic derivation.
    engine: E,
}

impl IdentityDerivationService<Bip44EthereumEngine> {
    /// Creates a service backed by the BIP44 Ethereum engine.
    pub fn with_bip44(secret: Arc<RootSecret>) -> Self {
        Self::new(secret, Bip44EthereumEngine)
    }
}

impl<E: KeyDerivationEngine> IdentityDerivationService<E> {
    /// Creates a new service from a root secret and an engine.
    pub const fn new(secret: Arc<RootSecret>, engine: E) -> Self {
        Self { secret, engine }
    }

    /// Derives the server identity for `user_address`.
    ///
    /// The address must be non-empty and `0x`-prefixed. The same root secret and the same
    /// address (in any letter case) always yield byte-identical keys.
    pub fn derive_user_server_address(
        &self,
        user_address: &str,
    ) -> Result<UserServerIdentity, IdentityError> {
        validate_user_address(user_address)?;

        let index = derivation_index(user_address);
        debug!(%user_address, index, "computed derivation index");

        let keys = self
            .engine
            .derive(self.secret.mnemonic(), index, self.secret.language())
            .inspect_err(|e| warn!(%user_address, index, %e, "key derivation failed"))?;

        info!(%user_address, server_address = %keys.address, "derived user server identity");

        Ok(UserServerIdentity {
            user_address: user_address.to_string(),
            derivation_index: index,
            keys,
        })
    }
}

/// Checks the preconditions on a user address.
fn validate_user_address(user_address: &str) -> Result<(), IdentityError> {
    if user_address.is_empty() {
        return Err(IdentityError::InvalidInput(
            "user address is required".to_string(),
        ));
    }
    if !user_address.starts_with(ADDRESS_PREFIX) {
        return Err(IdentityError::InvalidInput(format!(
            "user address must start with {ADDRESS_PREFIX}"
        )));
    }
    Ok(())
}
