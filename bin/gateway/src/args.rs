//! Parses command-line arguments for the compute gateway.

use std::{fmt, path::PathBuf};

use clap::{crate_version, Parser};
use compute_gateway_identity::DEFAULT_MNEMONIC_LANGUAGE;

#[derive(Parser)]
#[clap(
    name = "compute-gateway",
    about = "Identity and job-submission gateway for confidential compute",
    version = crate_version!()
)]
pub(crate) struct Cli {
    #[clap(
        long,
        short = 'c',
        help = "The file containing the configuration for the gateway",
        default_value = "config.toml"
    )]
    pub config: PathBuf,

    #[clap(
        long,
        env = "WALLET_MNEMONIC",
        hide_env_values = true,
        help = "The BIP39 mnemonic every user server identity is derived from"
    )]
    pub mnemonic: Option<String>,

    #[clap(
        long,
        env = "MNEMONIC_LANGUAGE",
        help = "The wordlist language of the mnemonic",
        default_value = DEFAULT_MNEMONIC_LANGUAGE
    )]
    pub mnemonic_language: String,
}

impl fmt::Debug for Cli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cli")
            .field("config", &self.config)
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("mnemonic_language", &self.mnemonic_language)
            .finish()
    }
}
