#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EIP-155 (EVM) ledger client for the Tachi pay-per-crawl protocol.
//!
//! [`Eip155Ledger`] implements [`tachi::ledger::Ledger`] over JSON-RPC using
//! alloy: ERC-20 balance, allowance and approval calls against the payment
//! token, and settlement calls against the payment processor contract.
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for RPC calls and submissions

pub mod contract;
pub mod error;
pub mod ledger;

pub use error::LedgerError;
pub use ledger::Eip155Ledger;
