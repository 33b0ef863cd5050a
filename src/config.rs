//! Configuration loading and tracing setup.
//!
//! Settings are split between a plaintext config TOML (contract
//! addresses, domains, poll tuning) and a secrets TOML (RPC endpoints,
//! wallet key), assembled into a runtime [`Ctx`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use alloy::primitives::{Address, B256};
use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use serde::Deserialize;
use tracing::Level;
use url::Url;

use crate::attestation::{DEFAULT_ATTESTATION_MAX_ATTEMPTS, DEFAULT_ATTESTATION_POLL_INTERVAL};
use crate::chain::{DEFAULT_RECEIPT_POLL_INTERVAL, DEFAULT_RECEIPT_TIMEOUT};

#[derive(Parser, Debug)]
pub struct Env {
    /// Path to plaintext TOML configuration file
    #[clap(long)]
    pub config: PathBuf,
    /// Path to TOML secrets file
    #[clap(long)]
    pub secrets: PathBuf,
}

/// Non-secret settings deserialized from the plaintext config TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    log_level: Option<LogLevel>,
    attestation_api_base: Url,
    receipt_poll_interval_secs: Option<u64>,
    receipt_timeout_secs: Option<u64>,
    attestation_poll_interval_secs: Option<u64>,
    attestation_max_attempts: Option<usize>,
    app_chain: ChainConfig,
    foreign_chain: ChainConfig,
}

/// One chain's contract surface from the plaintext config.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainConfig {
    name: String,
    usdc: Address,
    token_messenger: Address,
    message_transmitter: Address,
    domain: u32,
    /// Required for the app chain, absent for the foreign chain.
    campaign_manager: Option<Address>,
}

/// Secret credentials deserialized from the secrets TOML.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Secrets {
    wallet_private_key: B256,
    app_chain: ChainSecrets,
    foreign_chain: ChainSecrets,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ChainSecrets {
    rpc_url: Url,
}

/// Runtime context for one chain, assembled from config + secrets.
#[derive(Clone)]
pub struct ChainCtx {
    pub name: String,
    pub rpc_url: Url,
    pub usdc: Address,
    pub token_messenger: Address,
    pub message_transmitter: Address,
    pub domain: u32,
}

impl std::fmt::Debug for ChainCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainCtx")
            .field("name", &self.name)
            .field("rpc_url", &"[REDACTED]")
            .field("usdc", &self.usdc)
            .field("token_messenger", &self.token_messenger)
            .field("message_transmitter", &self.message_transmitter)
            .field("domain", &self.domain)
            .finish()
    }
}

impl ChainCtx {
    fn new(config: ChainConfig, secrets: ChainSecrets) -> Self {
        Self {
            name: config.name,
            rpc_url: secrets.rpc_url,
            usdc: config.usdc,
            token_messenger: config.token_messenger,
            message_transmitter: config.message_transmitter,
            domain: config.domain,
        }
    }
}

/// Combined runtime context, assembled from the two TOML files.
#[derive(Clone)]
pub struct Ctx {
    pub log_level: LogLevel,
    pub attestation_api_base: Url,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
    pub attestation_poll_interval: Duration,
    pub attestation_max_attempts: usize,
    pub app_chain: ChainCtx,
    pub foreign_chain: ChainCtx,
    pub campaign_manager: Address,
    wallet_private_key: B256,
}

impl std::fmt::Debug for Ctx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ctx")
            .field("log_level", &self.log_level)
            .field("attestation_api_base", &self.attestation_api_base)
            .field("app_chain", &self.app_chain)
            .field("foreign_chain", &self.foreign_chain)
            .field("campaign_manager", &self.campaign_manager)
            .field("wallet_private_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse TOML")]
    Toml(#[from] toml::de::Error),
    #[error("app_chain.campaign_manager is required")]
    MissingCampaignManager,
    #[error("failed to derive address from wallet_private_key")]
    PrivateKeyDerivation(#[source] alloy::signers::k256::ecdsa::Error),
}

impl Ctx {
    pub fn load_files(config: &Path, secrets: &Path) -> Result<Self, ConfigError> {
        let config_str = std::fs::read_to_string(config)?;
        let secrets_str = std::fs::read_to_string(secrets)?;
        Self::from_toml(&config_str, &secrets_str)
    }

    pub fn from_toml(config_toml: &str, secrets_toml: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(config_toml)?;
        let secrets: Secrets = toml::from_str(secrets_toml)?;

        let campaign_manager = config
            .app_chain
            .campaign_manager
            .ok_or(ConfigError::MissingCampaignManager)?;

        Ok(Self {
            log_level: config.log_level.unwrap_or(LogLevel::Info),
            attestation_api_base: config.attestation_api_base,
            receipt_poll_interval: config
                .receipt_poll_interval_secs
                .map_or(DEFAULT_RECEIPT_POLL_INTERVAL, Duration::from_secs),
            receipt_timeout: config
                .receipt_timeout_secs
                .map_or(DEFAULT_RECEIPT_TIMEOUT, Duration::from_secs),
            attestation_poll_interval: config
                .attestation_poll_interval_secs
                .map_or(DEFAULT_ATTESTATION_POLL_INTERVAL, Duration::from_secs),
            attestation_max_attempts: config
                .attestation_max_attempts
                .unwrap_or(DEFAULT_ATTESTATION_MAX_ATTEMPTS),
            app_chain: ChainCtx::new(config.app_chain, secrets.app_chain),
            foreign_chain: ChainCtx::new(config.foreign_chain, secrets.foreign_chain),
            campaign_manager,
            wallet_private_key: secrets.wallet_private_key,
        })
    }

    pub fn signer(&self) -> Result<PrivateKeySigner, ConfigError> {
        PrivateKeySigner::from_bytes(&self.wallet_private_key)
            .map_err(ConfigError::PrivateKeyDerivation)
    }

    pub fn wallet_address(&self) -> Result<Address, ConfigError> {
        Ok(self.signer()?.address())
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<&LogLevel> for Level {
    fn from(log_level: &LogLevel) -> Self {
        match log_level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

pub fn setup_tracing(log_level: &LogLevel) {
    let level: Level = log_level.into();
    let default_filter = format!("crowdfund_bridge={level}");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;

    fn example_config() -> &'static str {
        include_str!("../example.toml")
    }

    fn example_secrets() -> &'static str {
        include_str!("../example.secrets.toml")
    }

    #[test]
    fn example_files_load() {
        let ctx = Ctx::from_toml(example_config(), example_secrets()).unwrap();

        assert_eq!(ctx.app_chain.name, "sepolia");
        assert_eq!(ctx.app_chain.domain, 0);
        assert_eq!(ctx.foreign_chain.name, "fuji");
        assert_eq!(ctx.foreign_chain.domain, 1);
        assert_eq!(
            ctx.campaign_manager,
            address!("0x1111111111111111111111111111111111111111")
        );
    }

    #[test]
    fn defaults_applied_when_optional_fields_omitted() {
        let ctx = Ctx::from_toml(example_config(), example_secrets()).unwrap();

        assert_eq!(ctx.receipt_poll_interval, DEFAULT_RECEIPT_POLL_INTERVAL);
        assert_eq!(ctx.receipt_timeout, DEFAULT_RECEIPT_TIMEOUT);
        assert_eq!(
            ctx.attestation_poll_interval,
            DEFAULT_ATTESTATION_POLL_INTERVAL
        );
        assert_eq!(ctx.attestation_max_attempts, DEFAULT_ATTESTATION_MAX_ATTEMPTS);
        assert!(matches!(ctx.log_level, LogLevel::Info));
    }

    #[test]
    fn optional_fields_override_defaults() {
        let config = example_config().replace(
            "log_level = \"info\"",
            "log_level = \"warn\"\nreceipt_poll_interval_secs = 2\nattestation_max_attempts = 10",
        );

        let ctx = Ctx::from_toml(&config, example_secrets()).unwrap();

        assert!(matches!(ctx.log_level, LogLevel::Warn));
        assert_eq!(ctx.receipt_poll_interval, Duration::from_secs(2));
        assert_eq!(ctx.attestation_max_attempts, 10);
    }

    #[test]
    fn missing_campaign_manager_fails() {
        let config = example_config()
            .replace("campaign_manager = \"0x1111111111111111111111111111111111111111\"\n", "");

        let result = Ctx::from_toml(&config, example_secrets());

        assert!(
            matches!(result, Err(ConfigError::MissingCampaignManager)),
            "got: {result:?}"
        );
    }

    #[test]
    fn wallet_address_derives_from_private_key() {
        let ctx = Ctx::from_toml(example_config(), example_secrets()).unwrap();

        // Address of private key 0x...01.
        assert_eq!(
            ctx.wallet_address().unwrap(),
            address!("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf")
        );
    }

    #[test]
    fn zero_private_key_fails_derivation() {
        let secrets = example_secrets().replace(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
            "0x0000000000000000000000000000000000000000000000000000000000000000",
        );

        let ctx = Ctx::from_toml(example_config(), &secrets).unwrap();
        let result = ctx.wallet_address();

        assert!(
            matches!(result, Err(ConfigError::PrivateKeyDerivation(_))),
            "got: {result:?}"
        );
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let ctx = Ctx::from_toml(example_config(), example_secrets()).unwrap();
        let rendered = format!("{ctx:?}");

        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("publicnode"));
        assert!(!rendered.contains("0000000000000001"));
    }

    #[test]
    fn log_level_conversion() {
        assert_eq!(Level::from(&LogLevel::Trace), Level::TRACE);
        assert_eq!(Level::from(&LogLevel::Debug), Level::DEBUG);
        assert_eq!(Level::from(&LogLevel::Info), Level::INFO);
        assert_eq!(Level::from(&LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(&LogLevel::Error), Level::ERROR);
    }
}
