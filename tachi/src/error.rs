//! Error types for the Tachi pay-per-crawl protocol.
//!
//! Every fallible client operation surfaces exactly one [`TachiError`], which
//! tells the caller which family of failure occurred:
//!
//! - [`ConfigError`]: required configuration is missing or malformed
//! - [`NetworkError`]: the transport failed after the retry budget was spent
//! - [`PaymentError`]: the payment itself could not be completed

use std::fmt;

use alloy_primitives::TxHash;
use http::StatusCode;

use crate::amount::TokenAmount;
use crate::terms::RawPaymentTerms;

/// Top-level error returned by Tachi client operations.
#[derive(Debug, thiserror::Error)]
pub enum TachiError {
    /// Configuration is missing or invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Transport-level failure after retries were exhausted.
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Payment could not be completed.
    #[error(transparent)]
    Payment(#[from] PaymentError),
}

impl TachiError {
    /// Returns a short machine-readable code for the error family.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Payment(_) => "PAYMENT_ERROR",
        }
    }
}

/// Required configuration is missing or malformed. Never retried.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A payment was attempted without a signing credential.
    #[error("signing credential required for payments")]
    MissingSigner,

    /// Neither a signing credential nor an account address is configured.
    #[error("no account configured: provide a signing credential or an account address")]
    MissingAccount,

    /// `max_retries` must allow at least one attempt.
    #[error("max_retries must be at least 1")]
    InvalidMaxRetries,

    /// The signing credential could not be decoded into a key.
    #[error("invalid signing credential: {0}")]
    InvalidPrivateKey(String),

    /// A configuration value could not be interpreted.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The configuration source could not be read or parsed.
    #[error("failed to load configuration from {path}: {reason}")]
    Load {
        /// Path of the configuration file.
        path: String,
        /// Underlying read or parse failure.
        reason: String,
    },
}

/// Transport failure after the retry budget was exhausted.
#[derive(Debug, Clone, thiserror::Error)]
#[error("request to {url} failed after {attempts} attempt(s): {last_error}")]
pub struct NetworkError {
    /// The URL that was requested.
    pub url: String,
    /// Number of attempts made.
    pub attempts: u32,
    /// Description of the last underlying failure.
    pub last_error: String,
}

/// Stage of the payment flow, used for logging and to tag failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStage {
    /// Issuing the original request.
    Initial,
    /// A 402 was received and the terms are being parsed.
    AwaitingPaymentDecision,
    /// Checking the token balance against the required amount.
    VerifyingFunds,
    /// Checking or granting the spending allowance.
    EnsuringApproval,
    /// Submitting the settlement transaction.
    SubmittingPayment,
    /// Replaying the original request with the proof header.
    RetryingWithProof,
}

impl fmt::Display for PaymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initial => "initial",
            Self::AwaitingPaymentDecision => "awaiting_payment_decision",
            Self::VerifyingFunds => "verifying_funds",
            Self::EnsuringApproval => "ensuring_approval",
            Self::SubmittingPayment => "submitting_payment",
            Self::RetryingWithProof => "retrying_with_proof",
        };
        f.write_str(s)
    }
}

/// Why a set of payment terms was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTermsReason {
    /// No recipient was supplied in headers or body.
    #[error("missing recipient address")]
    MissingRecipient,
    /// The recipient is not a well-formed address.
    #[error("malformed recipient address `{0}`")]
    InvalidRecipient(String),
    /// No token contract was supplied in headers or body.
    #[error("missing token contract address")]
    MissingTokenAddress,
    /// The token contract is not a well-formed address.
    #[error("malformed token contract address `{0}`")]
    InvalidTokenAddress(String),
    /// The price could not be read as a non-negative decimal.
    #[error("malformed amount `{0}`")]
    InvalidAmount(String),
    /// The chain id is not an unsigned integer.
    #[error("malformed chain id `{0}`")]
    InvalidChainId(String),
    /// The token id is not an unsigned integer.
    #[error("malformed token id `{0}`")]
    InvalidTokenId(String),
    /// The amount has more fractional digits than the token supports.
    #[error("amount `{amount}` exceeds token precision of {decimals} decimals")]
    ExcessPrecision {
        /// Offending human amount.
        amount: String,
        /// Token decimals.
        decimals: u8,
    },
}

/// A payment could not be completed. Never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    /// The 402 response did not carry usable settlement terms.
    #[error("invalid payment information in 402 response: {reason}")]
    InvalidTerms {
        /// What was wrong with the terms.
        reason: InvalidTermsReason,
        /// Everything that could be read from the response.
        terms: Box<RawPaymentTerms>,
    },

    /// The account cannot cover the price.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount demanded by the server.
        required: TokenAmount,
        /// Amount held by the paying account.
        available: TokenAmount,
    },

    /// An on-chain step failed.
    #[error("payment transaction failed during {stage}: {source}")]
    Transaction {
        /// Stage at which the failure occurred.
        stage: PaymentStage,
        /// Approval transaction already confirmed before the failure, if any.
        approval_hash: Option<TxHash>,
        /// Underlying ledger failure.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The server did not accept the proof of payment.
    #[error("payment verification failed: server returned {status} for transaction {transaction_hash}")]
    VerificationFailed {
        /// Hash of the settlement transaction that was already spent.
        transaction_hash: TxHash,
        /// Status returned on the replayed request.
        status: StatusCode,
    },
}

impl PaymentError {
    /// Creates an [`InvalidTerms`](Self::InvalidTerms) error.
    #[must_use]
    pub fn invalid_terms(reason: InvalidTermsReason, terms: RawPaymentTerms) -> Self {
        Self::InvalidTerms {
            reason,
            terms: Box::new(terms),
        }
    }

    /// Returns the settlement transaction hash, when one was spent.
    #[must_use]
    pub const fn transaction_hash(&self) -> Option<&TxHash> {
        match self {
            Self::VerificationFailed {
                transaction_hash, ..
            } => Some(transaction_hash),
            _ => None,
        }
    }
}
