//! The root secret every server identity is derived from.

use std::fmt;

use zeroize::Zeroizing;

/// Wordlist language assumed when none is configured.
pub const DEFAULT_MNEMONIC_LANGUAGE: &str = "english";

/// BIP39 mnemonic plus the name of its wordlist language.
///
/// Built once at startup and shared read-only (behind an `Arc`) with whatever needs it. There is
/// no setter: rotating the secret means building a new service, which reassigns every derived
/// identity.
#[derive(Clone)]
pub struct RootSecret {
    /// Space separated mnemonic phrase.
    mnemonic: Zeroizing<String>,

    /// Wordlist language name, e.g. `english`.
    language: String,
}

impl RootSecret {
    /// Creates a new root secret.
    ///
    /// Neither value is validated here; a malformed mnemonic or unknown language surfaces as a
    /// derivation failure on first use.
    pub fn new(mnemonic: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            mnemonic: Zeroizing::new(mnemonic.into()),
            language: language.into(),
        }
    }

    /// A publicly known BIP39 test mnemonic.
    ///
    /// Anyone can derive every key from it. Only available to tests and to builds that explicitly
    /// enable the `test-secret` feature.
    #[cfg(any(test, feature = "test-secret"))]
    pub fn well_known_test() -> Self {
        Self::new(
            "shoe pass menu sniff phrase despair corn phone then rotate sheriff drop",
            DEFAULT_MNEMONIC_LANGUAGE,
        )
    }

    /// The mnemonic phrase.
    pub fn mnemonic(&self) -> &str {
        &self.mnemonic
    }

    /// The wordlist language name.
    pub fn language(&self) -> &str {
        &self.language
    }
}

impl fmt::Debug for RootSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootSecret")
            .field("mnemonic", &"<redacted>")
            .field("language", &self.language)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_mnemonic() {
        let secret = RootSecret::well_known_test();
        let rendered = format!("{secret:?}");

        assert!(!rendered.contains("sheriff"));
        assert!(rendered.contains("english"));
    }
}
