//! Client configuration.
//!
//! A [`TachiConfig`] is built once and stays immutable for the life of a
//! client. It can be assembled in code:
//!
//! ```rust
//! use tachi::config::TachiConfig;
//!
//! let config = TachiConfig::base_sepolia("https://sepolia.base.org".parse().unwrap())
//!     .with_max_retries(5);
//! assert_eq!(config.chain_id(), 84532);
//! ```
//!
//! or, with the `config-file` feature, loaded from TOML:
//!
//! ```toml
//! network = "base-sepolia"
//! rpc_url = "https://sepolia.base.org"
//! private_key = "$TACHI_PRIVATE_KEY"
//! settlement_contract = "0x…"
//! timeout_secs = 30
//! max_retries = 3
//! ```
//!
//! String values may reference environment variables as `$VAR` or `${VAR}`.

use std::fmt;
use std::time::Duration;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;
use crate::networks::Network;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default number of transport attempts per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff time unit in milliseconds.
pub const DEFAULT_BACKOFF_UNIT_MS: u64 = 1_000;

/// Configuration for a Tachi client.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TachiConfig {
    /// Chain payments settle on.
    pub network: Network,

    /// JSON-RPC endpoint of the chain.
    pub rpc_url: Url,

    /// Hex-encoded signing key. Without it the client is read-only.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,

    /// Account used for balance queries when no signing key is configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_address: Option<Address>,

    /// Token contract; defaults to the network's USDC deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<Address>,

    /// Publisher address passed to `payPublisher`. When unset, the recipient
    /// named in the 402 terms is paid. Approval and the settlement call always
    /// target that recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_contract: Option<Address>,

    /// Publisher NFT registry used to pay publishers by token id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nft_registry: Option<Address>,

    /// `User-Agent` sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Transport attempts per request, at least 1.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit in milliseconds; attempt `i` waits `2^i` units.
    #[serde(default = "default_backoff_unit_ms")]
    pub backoff_unit_ms: u64,
}

fn default_user_agent() -> String {
    format!("TachiSDK-Rust/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

const fn default_backoff_unit_ms() -> u64 {
    DEFAULT_BACKOFF_UNIT_MS
}

impl TachiConfig {
    /// Creates a configuration with defaults for everything but the chain.
    #[must_use]
    pub fn new(network: Network, rpc_url: Url) -> Self {
        Self {
            network,
            rpc_url,
            private_key: None,
            account_address: None,
            token_address: None,
            settlement_contract: None,
            nft_registry: None,
            user_agent: default_user_agent(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }

    /// Configuration for Base Mainnet.
    #[must_use]
    pub fn base(rpc_url: Url) -> Self {
        Self::new(Network::Base, rpc_url)
    }

    /// Configuration for Base Sepolia.
    #[must_use]
    pub fn base_sepolia(rpc_url: Url) -> Self {
        Self::new(Network::BaseSepolia, rpc_url)
    }

    /// Sets the signing key.
    #[must_use]
    pub fn with_private_key(mut self, key: impl Into<String>) -> Self {
        self.private_key = Some(key.into());
        self
    }

    /// Sets the read-only account address.
    #[must_use]
    pub const fn with_account_address(mut self, address: Address) -> Self {
        self.account_address = Some(address);
        self
    }

    /// Overrides the token contract.
    #[must_use]
    pub const fn with_token_address(mut self, address: Address) -> Self {
        self.token_address = Some(address);
        self
    }

    /// Sets the publisher address passed to `payPublisher`.
    #[must_use]
    pub const fn with_settlement_contract(mut self, address: Address) -> Self {
        self.settlement_contract = Some(address);
        self
    }

    /// Sets the publisher NFT registry.
    #[must_use]
    pub const fn with_nft_registry(mut self, address: Address) -> Self {
        self.nft_registry = Some(address);
        self
    }

    /// Sets the `User-Agent`.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    /// Sets the number of transport attempts.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the backoff time unit.
    #[must_use]
    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Chain id of the configured network.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.network.chain_id()
    }

    /// Token contract, falling back to the network's USDC deployment.
    #[must_use]
    pub fn token_address(&self) -> Address {
        self.token_address
            .unwrap_or_else(|| self.network.usdc_address())
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff time unit.
    #[must_use]
    pub const fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    /// Whether a signing key is configured.
    #[must_use]
    pub const fn can_sign(&self) -> bool {
        self.private_key.is_some()
    }

    /// Checks the invariants that can be checked without touching the chain.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidMaxRetries`] when `max_retries` is zero,
    /// [`ConfigError::InvalidPrivateKey`] for a key that is not 32 hex bytes,
    /// and [`ConfigError::InvalidValue`] for an empty user agent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidMaxRetries);
        }
        if let Some(key) = &self.private_key {
            let hex = key.trim().trim_start_matches("0x");
            if hex.len() != 64 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ConfigError::InvalidPrivateKey(
                    "expected 32 bytes of hex".to_owned(),
                ));
            }
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "user_agent",
                reason: "must not be empty".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Debug for TachiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TachiConfig")
            .field("network", &self.network)
            .field("rpc_url", &self.rpc_url.as_str())
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("account_address", &self.account_address)
            .field("token_address", &self.token_address)
            .field("settlement_contract", &self.settlement_contract)
            .field("nft_registry", &self.nft_registry)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_unit_ms", &self.backoff_unit_ms)
            .finish()
    }
}

#[cfg(feature = "config-file")]
impl TachiConfig {
    /// Loads configuration from a TOML file, expanding `$VAR` / `${VAR}`
    /// references from the process environment first.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the file cannot be read or parsed.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Load {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Load { reason, .. } => ConfigError::Load {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })
    }

    /// Parses configuration from a TOML string with environment expansion.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if the document does not parse.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| ConfigError::Load {
            path: "<inline>".to_owned(),
            reason: e.to_string(),
        })
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
#[cfg(feature = "config-file")]
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match std::env::var(&var_name) {
            Ok(val) if !var_name.is_empty() => result.push_str(&val),
            _ if braced => {
                result.push_str("${");
                result.push_str(&var_name);
                if !var_name.is_empty() {
                    result.push('}');
                }
            }
            _ => {
                result.push('$');
                result.push_str(&var_name);
            }
        }
    }

    result
}
