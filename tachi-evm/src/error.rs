//! Error types for the EVM ledger.

use alloy_primitives::TxHash;
use alloy_provider::PendingTransactionError;
use alloy_transport::TransportError;

/// Errors returned by [`Eip155Ledger`](crate::Eip155Ledger).
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// RPC transport error.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Waiting for the transaction receipt failed.
    #[error(transparent)]
    PendingTransaction(#[from] PendingTransactionError),
    /// Contract call could not be encoded or decoded.
    #[error("Contract call failed: {0}")]
    ContractCall(String),
    /// On-chain transaction was reverted.
    #[error("Transaction {tx_hash} reverted")]
    Reverted {
        /// Hash of the reverted transaction.
        tx_hash: TxHash,
    },
    /// A transaction was requested from a read-only ledger.
    #[error("Signing credential required to submit transactions")]
    SignerRequired,
    /// The node serves a different chain than configured.
    #[error("RPC endpoint is on chain {actual}, expected {expected}")]
    ChainMismatch {
        /// Chain id of the configured network.
        expected: u64,
        /// Chain id reported by the node.
        actual: u64,
    },
}

impl From<alloy_contract::Error> for LedgerError {
    fn from(e: alloy_contract::Error) -> Self {
        match e {
            alloy_contract::Error::TransportError(e) => Self::Transport(e),
            alloy_contract::Error::PendingTransactionError(e) => Self::PendingTransaction(e),
            alloy_contract::Error::UnknownFunction(_)
            | alloy_contract::Error::UnknownSelector(_)
            | alloy_contract::Error::NotADeploymentTransaction
            | alloy_contract::Error::ContractNotDeployed
            | alloy_contract::Error::ZeroData(_, _)
            | alloy_contract::Error::AbiError(_) => Self::ContractCall(e.to_string()),
        }
    }
}
