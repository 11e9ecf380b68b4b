//! Abstraction over the on-chain side of a payment.
//!
//! A [`Ledger`] reads token balances and allowances, grants approvals and
//! submits settlement transactions. Every amount crossing this boundary is in
//! token base units; conversion to human amounts happens in the caller.
//!
//! Nothing here is cached: each call observes fresh chain state, and each
//! submission fetches its own nonce. Callers must serialise payments from the
//! same account.

use std::future::Future;

use alloy_primitives::{Address, TxHash, U256};

use crate::amount::TokenAmount;

/// How the settlement contract should credit the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementInstruction {
    /// `payPublisher(publisher, amount)`.
    PayPublisher {
        /// Publisher receiving the payment.
        publisher: Address,
    },
    /// `payPublisherByNFT(nftContract, tokenId, amount)`.
    PayPublisherByNft {
        /// Registry contract holding the publisher's NFT.
        nft_contract: Address,
        /// Publisher's token id.
        token_id: U256,
    },
}

/// Outcome of [`Ledger::ensure_approval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Approval {
    /// The existing allowance already covers the amount; nothing was sent.
    Sufficient {
        /// Allowance observed on chain.
        allowance: U256,
    },
    /// An approval transaction was sent and confirmed.
    Granted {
        /// Hash of the confirmed approval.
        tx_hash: TxHash,
    },
}

impl Approval {
    /// Hash of the approval transaction, if one was sent.
    #[must_use]
    pub const fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Sufficient { .. } => None,
            Self::Granted { tx_hash } => Some(*tx_hash),
        }
    }
}

/// Token balance in both representations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    /// Raw on-chain balance.
    pub base_units: U256,
    /// Balance in human units.
    pub formatted: TokenAmount,
}

/// Token and settlement operations against a chain.
///
/// Submitting methods block until the transaction is mined and fail if it
/// reverted. They do not impose a confirmation timeout.
pub trait Ledger: Send + Sync {
    /// Error type for ledger operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Account that pays, if one is known.
    fn account(&self) -> Option<Address>;

    /// Whether this ledger can sign and submit transactions.
    fn can_sign(&self) -> bool;

    /// Token balance of `account`.
    fn balance(
        &self,
        token: Address,
        account: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send;

    /// Amount `spender` may transfer on behalf of `owner`.
    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send;

    /// Approves `spender` for exactly `amount` and waits for confirmation.
    fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send;

    /// Calls the settlement contract and waits for confirmation.
    fn pay(
        &self,
        settlement: Address,
        instruction: SettlementInstruction,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send;

    /// Makes sure `spender` may move at least `required` from `owner`.
    ///
    /// Reads the current allowance and only submits an approval when it is
    /// short. Calling it again after success is a no-op.
    fn ensure_approval(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
        required: U256,
    ) -> impl Future<Output = Result<Approval, Self::Error>> + Send {
        async move {
            let allowance = self.allowance(token, owner, spender).await?;
            if allowance >= required {
                #[cfg(feature = "telemetry")]
                tracing::debug!(%allowance, %required, "Allowance sufficient, skipping approval");
                return Ok(Approval::Sufficient { allowance });
            }
            #[cfg(feature = "telemetry")]
            tracing::info!(%spender, %required, "Approving settlement contract to spend tokens");
            let tx_hash = self.approve(token, spender, required).await?;
            Ok(Approval::Granted { tx_hash })
        }
    }
}

impl<T: Ledger> Ledger for std::sync::Arc<T> {
    type Error = T::Error;

    fn account(&self) -> Option<Address> {
        (**self).account()
    }

    fn can_sign(&self) -> bool {
        (**self).can_sign()
    }

    fn balance(
        &self,
        token: Address,
        account: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send {
        (**self).balance(token, account)
    }

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send {
        (**self).allowance(token, owner, spender)
    }

    fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send {
        (**self).approve(token, spender, amount)
    }

    fn pay(
        &self,
        settlement: Address,
        instruction: SettlementInstruction,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send {
        (**self).pay(settlement, instruction, amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, thiserror::Error)]
    #[error("ledger offline")]
    struct Offline;

    #[derive(Default)]
    struct CountingLedger {
        allowance: Mutex<U256>,
        approvals: Mutex<Vec<U256>>,
    }

    impl Ledger for CountingLedger {
        type Error = Offline;

        fn account(&self) -> Option<Address> {
            Some(Address::repeat_byte(1))
        }

        fn can_sign(&self) -> bool {
            true
        }

        async fn balance(&self, _token: Address, _account: Address) -> Result<U256, Offline> {
            Err(Offline)
        }

        async fn allowance(
            &self,
            _token: Address,
            _owner: Address,
            _spender: Address,
        ) -> Result<U256, Offline> {
            Ok(*self.allowance.lock().unwrap())
        }

        async fn approve(
            &self,
            _token: Address,
            _spender: Address,
            amount: U256,
        ) -> Result<TxHash, Offline> {
            self.approvals.lock().unwrap().push(amount);
            *self.allowance.lock().unwrap() = amount;
            Ok(TxHash::repeat_byte(0xaa))
        }

        async fn pay(
            &self,
            _settlement: Address,
            _instruction: SettlementInstruction,
            _amount: U256,
        ) -> Result<TxHash, Offline> {
            Err(Offline)
        }
    }

    const TOKEN: Address = Address::new([2u8; 20]);
    const SPENDER: Address = Address::new([3u8; 20]);

    #[tokio::test]
    async fn test_sufficient_allowance_sends_nothing() {
        let ledger = CountingLedger::default();
        *ledger.allowance.lock().unwrap() = U256::from(5_000_000u64);

        let approval = ledger
            .ensure_approval(TOKEN, Address::ZERO, SPENDER, U256::from(1_000_000u64))
            .await
            .unwrap();

        assert_eq!(
            approval,
            Approval::Sufficient {
                allowance: U256::from(5_000_000u64)
            }
        );
        assert_eq!(approval.tx_hash(), None);
        assert!(ledger.approvals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_allowance_approves_exact_amount_once() {
        let ledger = CountingLedger::default();
        let required = U256::from(1_000_000u64);

        let first = ledger
            .ensure_approval(TOKEN, Address::ZERO, SPENDER, required)
            .await
            .unwrap();
        assert_eq!(first.tx_hash(), Some(TxHash::repeat_byte(0xaa)));

        let second = ledger
            .ensure_approval(TOKEN, Address::ZERO, SPENDER, required)
            .await
            .unwrap();
        assert!(matches!(second, Approval::Sufficient { .. }));
        assert_eq!(*ledger.approvals.lock().unwrap(), vec![required]);
    }

    #[tokio::test]
    async fn test_allowance_error_propagates() {
        struct Broken;
        impl Ledger for Broken {
            type Error = Offline;
            fn account(&self) -> Option<Address> {
                None
            }
            fn can_sign(&self) -> bool {
                false
            }
            async fn balance(&self, _: Address, _: Address) -> Result<U256, Offline> {
                Err(Offline)
            }
            async fn allowance(&self, _: Address, _: Address, _: Address) -> Result<U256, Offline> {
                Err(Offline)
            }
            async fn approve(&self, _: Address, _: Address, _: U256) -> Result<TxHash, Offline> {
                Err(Offline)
            }
            async fn pay(
                &self,
                _: Address,
                _: SettlementInstruction,
                _: U256,
            ) -> Result<TxHash, Offline> {
                Err(Offline)
            }
        }

        let result = Broken
            .ensure_approval(TOKEN, Address::ZERO, SPENDER, U256::from(1u64))
            .await;
        assert!(result.is_err());
    }
}
