//! Supported EVM networks and their USDC deployments.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::{Address, address};
use serde::{Deserialize, Serialize};

/// Base Mainnet chain ID.
pub const BASE_MAINNET: u64 = 8453;

/// Base Sepolia (testnet) chain ID.
pub const BASE_SEPOLIA: u64 = 84532;

/// Ethereum Mainnet chain ID.
pub const ETHEREUM_MAINNET: u64 = 1;

/// Polygon Mainnet chain ID.
pub const POLYGON_MAINNET: u64 = 137;

/// Polygon Amoy (testnet) chain ID.
pub const POLYGON_AMOY: u64 = 80002;

/// Avalanche C-Chain chain ID.
pub const AVALANCHE_MAINNET: u64 = 43114;

/// Avalanche Fuji (testnet) chain ID.
pub const AVALANCHE_FUJI: u64 = 43113;

/// Celo Mainnet chain ID.
pub const CELO_MAINNET: u64 = 42220;

/// USDC contract address on Base Mainnet.
pub const USDC_BASE: Address = address!("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913");

/// USDC contract address on Base Sepolia.
pub const USDC_BASE_SEPOLIA: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");

/// USDC contract address on Ethereum Mainnet.
pub const USDC_ETHEREUM: Address = address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

/// USDC contract address on Polygon Mainnet.
pub const USDC_POLYGON: Address = address!("3c499c542cEF5E3811e1192ce70d8cC03d5c3359");

/// USDC contract address on Polygon Amoy.
pub const USDC_POLYGON_AMOY: Address = address!("41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF");

/// USDC contract address on Avalanche C-Chain.
pub const USDC_AVALANCHE: Address = address!("B97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");

/// USDC contract address on Avalanche Fuji.
pub const USDC_AVALANCHE_FUJI: Address = address!("5425890298aed601595a70AB815c96711a31Bc65");

/// USDC contract address on Celo.
pub const USDC_CELO: Address = address!("cebA9300f2b948710d2653dD7B07f33A8B32118C");

/// A chain the client can settle payments on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Base Mainnet.
    Base,
    /// Base Sepolia testnet.
    BaseSepolia,
    /// Ethereum Mainnet.
    Ethereum,
    /// Polygon PoS.
    Polygon,
    /// Polygon Amoy testnet.
    PolygonAmoy,
    /// Avalanche C-Chain.
    Avalanche,
    /// Avalanche Fuji testnet.
    AvalancheFuji,
    /// Celo Mainnet.
    Celo,
}

impl Network {
    /// All supported networks.
    pub const ALL: [Self; 8] = [
        Self::Base,
        Self::BaseSepolia,
        Self::Ethereum,
        Self::Polygon,
        Self::PolygonAmoy,
        Self::Avalanche,
        Self::AvalancheFuji,
        Self::Celo,
    ];

    /// Numeric EIP-155 chain id.
    #[must_use]
    pub const fn chain_id(self) -> u64 {
        match self {
            Self::Base => BASE_MAINNET,
            Self::BaseSepolia => BASE_SEPOLIA,
            Self::Ethereum => ETHEREUM_MAINNET,
            Self::Polygon => POLYGON_MAINNET,
            Self::PolygonAmoy => POLYGON_AMOY,
            Self::Avalanche => AVALANCHE_MAINNET,
            Self::AvalancheFuji => AVALANCHE_FUJI,
            Self::Celo => CELO_MAINNET,
        }
    }

    /// Default USDC token address on this network.
    #[must_use]
    pub const fn usdc_address(self) -> Address {
        match self {
            Self::Base => USDC_BASE,
            Self::BaseSepolia => USDC_BASE_SEPOLIA,
            Self::Ethereum => USDC_ETHEREUM,
            Self::Polygon => USDC_POLYGON,
            Self::PolygonAmoy => USDC_POLYGON_AMOY,
            Self::Avalanche => USDC_AVALANCHE,
            Self::AvalancheFuji => USDC_AVALANCHE_FUJI,
            Self::Celo => USDC_CELO,
        }
    }

    /// Kebab-case identifier, as used in configuration files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::BaseSepolia => "base-sepolia",
            Self::Ethereum => "ethereum",
            Self::Polygon => "polygon",
            Self::PolygonAmoy => "polygon-amoy",
            Self::Avalanche => "avalanche",
            Self::AvalancheFuji => "avalanche-fuji",
            Self::Celo => "celo",
        }
    }

    /// Looks up a supported network by chain id.
    #[must_use]
    pub fn from_chain_id(chain_id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.chain_id() == chain_id)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unsupported network name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported network `{0}`")]
pub struct UnknownNetwork(pub String);

impl FromStr for Network {
    type Err = UnknownNetwork;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == needle)
            .ok_or_else(|| UnknownNetwork(s.to_owned()))
    }
}
