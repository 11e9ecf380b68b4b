//! Command-line arguments and configuration resolution.
//!
//! Settings come from three layers, highest precedence first:
//!
//! 1. command-line flags
//! 2. `TACHI_*` environment variables (a `.env` file is loaded first)
//! 3. the TOML file named by `--config` / `TACHI_CONFIG` (default `tachi.toml`)
//!
//! Values absent from every layer fall back to the library defaults. The file
//! is optional; without it `--rpc-url` must be given.

use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::Address;
use clap::{Args, Parser, Subcommand};
use tachi::config::TachiConfig;
use tachi::error::ConfigError;
use tachi::networks::Network;
use url::Url;

/// Default configuration file name.
pub const DEFAULT_CONFIG_PATH: &str = "tachi.toml";

/// Pay-per-crawl HTTP client.
#[derive(Debug, Parser)]
#[command(name = "tachi", version)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, short, env = "TACHI_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Settings overriding the configuration file.
    #[command(flatten)]
    pub overrides: Overrides,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Settings that may be given as flags or environment variables.
#[derive(Debug, Default, Clone, Args)]
pub struct Overrides {
    /// Network payments settle on.
    #[arg(long, env = "TACHI_NETWORK", global = true)]
    pub network: Option<Network>,

    /// JSON-RPC endpoint.
    #[arg(long, env = "TACHI_RPC_URL", global = true)]
    pub rpc_url: Option<Url>,

    /// Hex-encoded signing key.
    #[arg(long, env = "TACHI_PRIVATE_KEY", hide_env_values = true, global = true)]
    pub private_key: Option<String>,

    /// Account to query when no signing key is given.
    #[arg(long, env = "TACHI_ACCOUNT_ADDRESS", global = true)]
    pub account_address: Option<Address>,

    /// Token contract, if not the network's USDC.
    #[arg(long, env = "TACHI_TOKEN_ADDRESS", global = true)]
    pub token_address: Option<Address>,

    /// Publisher address passed to the settlement call.
    #[arg(long, env = "TACHI_SETTLEMENT_CONTRACT", global = true)]
    pub settlement_contract: Option<Address>,

    /// Publisher NFT registry contract.
    #[arg(long, env = "TACHI_NFT_REGISTRY", global = true)]
    pub nft_registry: Option<Address>,

    /// `User-Agent` header.
    #[arg(long, env = "TACHI_USER_AGENT", global = true)]
    pub user_agent: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, env = "TACHI_TIMEOUT_SECS", global = true)]
    pub timeout_secs: Option<u64>,

    /// Transport attempts per request.
    #[arg(long, env = "TACHI_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,

    /// Backoff unit in milliseconds.
    #[arg(long, env = "TACHI_BACKOFF_UNIT_MS", global = true)]
    pub backoff_unit_ms: Option<u64>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch a URL, paying if the publisher answers 402.
    Fetch {
        /// URL to fetch.
        url: String,

        /// HTTP method.
        #[arg(long, short = 'X', default_value = "GET")]
        method: http::Method,

        /// Extra header as `Name: value`; may be repeated.
        #[arg(long = "header", short = 'H')]
        headers: Vec<String>,

        /// Request body.
        #[arg(long, short)]
        data: Option<String>,
    },
    /// Print the token balance of the configured account.
    Balance,
    /// Check that the RPC endpoint serves the configured network.
    Check,
}

impl Overrides {
    /// Applies every set override on top of `config`.
    #[must_use]
    pub fn apply(self, mut config: TachiConfig) -> TachiConfig {
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.rpc_url = rpc_url;
        }
        if let Some(key) = self.private_key {
            config = config.with_private_key(key);
        }
        if let Some(address) = self.account_address {
            config = config.with_account_address(address);
        }
        if let Some(address) = self.token_address {
            config = config.with_token_address(address);
        }
        if let Some(address) = self.settlement_contract {
            config = config.with_settlement_contract(address);
        }
        if let Some(address) = self.nft_registry {
            config = config.with_nft_registry(address);
        }
        if let Some(user_agent) = self.user_agent {
            config = config.with_user_agent(user_agent);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(max_retries) = self.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let Some(ms) = self.backoff_unit_ms {
            config = config.with_backoff_unit(Duration::from_millis(ms));
        }
        config
    }

    /// Builds a configuration from overrides alone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if no RPC endpoint is given.
    pub fn into_config(self) -> Result<TachiConfig, ConfigError> {
        let rpc_url = self.rpc_url.clone().ok_or(ConfigError::InvalidValue {
            field: "rpc_url",
            reason: "no configuration file found and no RPC endpoint given".to_owned(),
        })?;
        let network = self.network.unwrap_or(Network::Base);
        Ok(self.apply(TachiConfig::new(network, rpc_url)))
    }
}

impl Cli {
    /// Resolves the effective configuration from file, environment and flags.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be parsed, if
    /// no RPC endpoint is available, or if the result fails validation.
    pub fn resolve_config(&self) -> Result<TachiConfig, ConfigError> {
        let overrides = self.overrides.clone();
        let config = if self.config.exists() {
            tracing::debug!(path = %self.config.display(), "Loading configuration file");
            overrides.apply(TachiConfig::load_from(&self.config)?)
        } else {
            tracing::debug!(
                path = %self.config.display(),
                "No configuration file, using flags and environment"
            );
            overrides.into_config()?
        };
        config.validate()?;
        Ok(config)
    }
}
