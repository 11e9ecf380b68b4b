#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP transport for the Tachi pay-per-crawl protocol.
//!
//! - [`fetch`] sends requests through a pooled reqwest client, retrying
//!   transport failures with exponential backoff.
//! - [`client`] wraps the fetcher and a [`tachi::ledger::Ledger`] into
//!   [`TachiClient`], which pays for 402 responses and replays the request
//!   with proof of payment.
//!
//! # Example
//!
//! ```ignore
//! use tachi::TachiConfig;
//! use tachi_evm::Eip155Ledger;
//! use tachi_http::TachiClient;
//!
//! let config = TachiConfig::base_sepolia("https://sepolia.base.org".parse()?)
//!     .with_private_key(std::env::var("TACHI_PRIVATE_KEY")?);
//! let ledger = Eip155Ledger::connect(&config)?;
//! let client = TachiClient::new(config, ledger)?;
//!
//! let result = client.fetch("https://publisher.example/article").await?;
//! if let Some(payment) = result.payment {
//!     println!("paid {} in {}", payment.amount, payment.transaction_hash);
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for requests and payment stages

pub mod client;
pub mod constants;
pub mod fetch;

pub use client::TachiClient;
pub use fetch::{FetchRequest, HttpFetcher, RawResponse, RetryPolicy};
