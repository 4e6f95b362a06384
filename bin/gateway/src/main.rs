//! The compute gateway accepts signed operation requests for a compute backend and hands out
//! deterministic per-user server identities.

use std::{fs, path::Path, sync::Arc};

use anyhow::Context;
use clap::Parser;
use compute_gateway_common::{logging, logging::LoggerConfig};
use compute_gateway_identity::{
    Bip44EthereumEngine, IdentityDerivationService, KeyDerivationEngine, RootSecret,
};
use compute_gateway_operations::{InMemoryBackend, OperationLifecycleManager, PersonalSignValidator};
use config::Config;
use constants::{DEFAULT_THREAD_COUNT, DEFAULT_THREAD_STACK_SIZE, SERVICE_NAME};
use rpc_server::{start_rpc, GatewayRpc};
use serde::de::DeserializeOwned;
use tokio::runtime;
use tracing::{debug, info, trace, warn};

mod args;
mod config;
mod rpc_server;

mod constants;

fn main() -> anyhow::Result<()> {
    // A missing `.env` is fine, the environment may be set up some other way.
    let dotenv = dotenvy::dotenv();

    let cli = args::Cli::parse();
    let config = parse_toml::<Config>(&cli.config)?;

    let runtime = runtime::Builder::new_multi_thread()
        .worker_threads(config.num_threads.unwrap_or(DEFAULT_THREAD_COUNT).into())
        .thread_stack_size(
            config
                .thread_stack_size
                .unwrap_or(DEFAULT_THREAD_STACK_SIZE),
        )
        .enable_all()
        .build()
        .context("must be able to create runtime")?;

    // The OTLP exporter needs a runtime to be in scope.
    let _guard = runtime.enter();
    logging::init(LoggerConfig::from_env(SERVICE_NAME));

    match dotenv {
        Ok(path) => debug!(?path, "loaded environment file"),
        Err(e) => trace!(%e, "no environment file loaded"),
    }
    debug!(?cli, ?config, "parsed configuration");

    let secret = Arc::new(root_secret(cli.mnemonic, cli.mnemonic_language)?);
    check_root_secret(&secret)?;

    runtime.block_on(run(config, secret))?;

    info!("gateway shutdown complete");
    Ok(())
}

async fn run(config: Config, secret: Arc<RootSecret>) -> anyhow::Result<()> {
    let backend = InMemoryBackend::new();
    if let Some(interval) = config.backend.simulate_interval {
        let _simulator = backend.spawn_simulator(interval);
    }

    let validator = if config.signatures.allowed_signers.is_empty() {
        warn!("no allowed signers configured, accepting any valid signature");
        PersonalSignValidator::accept_any()
    } else {
        PersonalSignValidator::from_addresses(&config.signatures.allowed_signers)
            .context("invalid address in signatures.allowed_signers")?
    };

    let operations = Arc::new(OperationLifecycleManager::new(backend, validator));
    let identity = Arc::new(IdentityDerivationService::with_bip44(secret));
    let rpc_impl = GatewayRpc::new(operations, identity);

    start_rpc(&rpc_impl, &config.rpc_addr).await
}

/// Builds the root secret from the configured mnemonic.
///
/// Without one, startup fails unless the binary was built with the `test-secret` feature.
fn root_secret(mnemonic: Option<String>, language: String) -> anyhow::Result<RootSecret> {
    match mnemonic.filter(|m| !m.trim().is_empty()) {
        Some(mnemonic) => Ok(RootSecret::new(mnemonic, language)),
        None => missing_mnemonic(language),
    }
}

#[cfg(feature = "test-secret")]
fn missing_mnemonic(language: String) -> anyhow::Result<RootSecret> {
    warn!(%language, "WALLET_MNEMONIC is not set, using the well-known TEST mnemonic; never use this build in production");
    Ok(RootSecret::well_known_test())
}

#[cfg(not(feature = "test-secret"))]
fn missing_mnemonic(_language: String) -> anyhow::Result<RootSecret> {
    anyhow::bail!("WALLET_MNEMONIC is not set")
}

/// Derives one throwaway identity so that a malformed mnemonic or unknown language fails
/// startup rather than the first request.
fn check_root_secret(secret: &RootSecret) -> anyhow::Result<()> {
    Bip44EthereumEngine
        .derive(secret.mnemonic(), 0, secret.language())
        .map(|_| ())
        .context("root secret cannot derive keys")?;

    info!(language = %secret.language(), "root secret loaded");
    Ok(())
}

/// Reads and parses a TOML file from the given path into the given type `T`.
fn parse_toml<T>(path: impl AsRef<Path>) -> anyhow::Result<T>
where
    T: std::fmt::Debug + DeserializeOwned,
{
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read TOML file {}", path.display()))?;

    toml::from_str::<T>(&raw)
        .with_context(|| format!("failed to parse TOML file {}", path.display()))
}
