//! Command-line pay-per-crawl client.
//!
//! Wires the EVM ledger into the payment orchestrator and exposes it as the
//! `tachi` binary.
//!
//! # Modules
//!
//! - [`cli`]: argument parsing and layered configuration
//! - [`commands`]: `fetch`, `balance` and `check`
//! - [`error`]: error type and exit codes

pub mod cli;
pub mod commands;
pub mod error;

pub use cli::Cli;
pub use error::CliError;
