#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the Tachi pay-per-crawl protocol.
//!
//! A crawler requests a resource; a publisher that charges for access answers
//! with HTTP 402 and the terms of payment. The client pays on chain through a
//! settlement contract and replays the request with the transaction hash as
//! proof. This crate holds the chain-agnostic pieces of that flow. The EVM
//! ledger and the HTTP client live in separate crates.
//!
//! # Modules
//!
//! - [`amount`] - Human-readable token amounts and base-unit conversion
//! - [`config`] - Client configuration
//! - [`error`] - Error families surfaced to callers
//! - [`ledger`] - Abstraction over balance, allowance and settlement calls
//! - [`networks`] - Registry of supported chains and their USDC contracts
//! - [`response`] - Outcome of a fetch
//! - [`terms`] - Extraction and validation of 402 payment terms
//!
//! # Feature Flags
//!
//! - `config-file` - Loading configuration from TOML files
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod amount;
pub mod config;
pub mod error;
pub mod ledger;
pub mod networks;
pub mod response;
pub mod terms;

pub use amount::TokenAmount;
pub use config::TachiConfig;
pub use error::{ConfigError, NetworkError, PaymentError, PaymentStage, TachiError};
pub use ledger::{Approval, Balance, Ledger, SettlementInstruction};
pub use networks::Network;
pub use response::{FetchResult, PaymentReceipt};
pub use terms::{PaymentTerms, RawPaymentTerms};
