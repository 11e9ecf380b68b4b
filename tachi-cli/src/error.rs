//! Errors surfaced by the `tachi` binary.

use tachi::error::{ConfigError, TachiError};
use tachi_evm::LedgerError;

/// Top-level error of a CLI run.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Fetch or payment failure.
    #[error(transparent)]
    Tachi(#[from] TachiError),
    /// Ledger query failure outside a payment.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    /// A `--header` argument is not `Name: value`.
    #[error("invalid header `{0}`: expected `Name: value`")]
    InvalidHeader(String),
    /// Writing the result failed.
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    /// Serializing the result failed.
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::Tachi(TachiError::Config(e))
    }
}

impl CliError {
    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Tachi(TachiError::Config(_)) | Self::InvalidHeader(_) => 2,
            Self::Tachi(TachiError::Network(_)) | Self::Ledger(_) => 3,
            Self::Tachi(TachiError::Payment(_)) => 4,
            Self::Output(_) | Self::Encode(_) => 1,
        }
    }
}
