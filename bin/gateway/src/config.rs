use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The configuration values that dictate the behavior of the gateway.
///
/// The root mnemonic is deliberately absent: it comes from the environment or the command line
/// so that configuration files can be shared and checked in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Config {
    /// The RPC server addr for the gateway.
    pub rpc_addr: String,

    /// The number of runtime worker threads.
    pub num_threads: Option<u8>,

    /// The stack size of each runtime worker thread, in bytes.
    pub thread_stack_size: Option<usize>,

    /// Request signature settings.
    #[serde(default)]
    pub signatures: SignatureConfig,

    /// Compute backend settings.
    #[serde(default)]
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SignatureConfig {
    /// `0x` addresses whose signatures are accepted. Empty accepts any recoverable signer.
    #[serde(default)]
    pub allowed_signers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct BackendConfig {
    /// When set, a simulator advances every in-memory job one step per interval.
    pub simulate_interval: Option<Duration>,
}
