//! Payment orchestration for pay-per-crawl fetches.
//!
//! [`TachiClient`] sends a request and, when the publisher answers with
//! 402 Payment Required, walks the payment stages in order:
//!
//! 1. parse the settlement terms from the 402 response
//! 2. check that the paying account holds enough tokens
//! 3. make sure the settlement recipient may spend them
//! 4. submit the payment and wait for it to be mined
//! 5. replay the original request with the transaction hash as proof
//!
//! Each step awaits the previous one. Failures after step 4 leave the
//! payment spent; the error carries the transaction hash where one exists.

use alloy_primitives::{Address, TxHash};
use http::header::HeaderValue;
use http::StatusCode;
use tachi::amount::{TokenAmount, USDC_DECIMALS};
use tachi::config::TachiConfig;
use tachi::error::{ConfigError, NetworkError, PaymentError, PaymentStage, TachiError};
use tachi::ledger::{Balance, Ledger, SettlementInstruction};
use tachi::response::{FetchResult, PaymentReceipt, flatten_headers};
use tachi::terms::PaymentTerms;
#[cfg(feature = "telemetry")]
use tracing::{debug, info, instrument, warn};

use crate::constants::{HTTP_STATUS_PAYMENT_REQUIRED, PROOF_HEADER, PROOF_SCHEME};
use crate::fetch::{FetchRequest, HttpFetcher, RawResponse};

/// Pay-per-crawl client combining an HTTP fetcher with a [`Ledger`].
#[derive(Debug, Clone)]
pub struct TachiClient<L> {
    config: TachiConfig,
    fetcher: HttpFetcher,
    ledger: L,
}

impl<L: Ledger> TachiClient<L> {
    /// Creates a client from a validated configuration and a ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration is invalid or the HTTP
    /// client cannot be built.
    pub fn new(config: TachiConfig, ledger: L) -> Result<Self, ConfigError> {
        config.validate()?;
        let fetcher = HttpFetcher::from_config(&config)?;
        Ok(Self::with_fetcher(config, fetcher, ledger))
    }

    /// Creates a client around an existing fetcher.
    #[must_use]
    pub const fn with_fetcher(config: TachiConfig, fetcher: HttpFetcher, ledger: L) -> Self {
        Self {
            config,
            fetcher,
            ledger,
        }
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &TachiConfig {
        &self.config
    }

    /// Ledger in use.
    #[must_use]
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Paying account, if any.
    #[must_use]
    pub fn account(&self) -> Option<Address> {
        self.ledger.account()
    }

    /// Fetches `url` with `GET`, paying if the publisher demands it.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn fetch(&self, url: impl Into<String>) -> Result<FetchResult, TachiError> {
        self.send(FetchRequest::get(url)).await
    }

    /// Sends `request`, paying if the publisher demands it.
    ///
    /// # Errors
    ///
    /// - [`TachiError::Network`] if the initial request or the replay cannot
    ///   be delivered within the retry budget
    /// - [`TachiError::Config`] if payment is demanded but no signer is configured
    /// - [`TachiError::Payment`] if the payment cannot be completed or the
    ///   publisher rejects the proof
    #[cfg_attr(
        feature = "telemetry",
        instrument(
            name = "tachi.fetch",
            skip_all,
            fields(method = %request.method, url = %request.url),
            err
        )
    )]
    pub async fn send(&self, request: FetchRequest) -> Result<FetchResult, TachiError> {
        #[cfg(feature = "telemetry")]
        debug!(stage = %PaymentStage::Initial, "Sending request");
        let response = self.fetcher.send(&request).await?;

        if response.status.as_u16() != HTTP_STATUS_PAYMENT_REQUIRED {
            #[cfg(feature = "telemetry")]
            debug!(status = %response.status, "No payment required");
            return Ok(unpaid(response));
        }

        #[cfg(feature = "telemetry")]
        info!(stage = %PaymentStage::AwaitingPaymentDecision, "Payment required, parsing terms");
        let terms = PaymentTerms::parse(&response.headers, &response.body)?;
        let receipt = self.pay(&terms).await?;

        #[cfg(feature = "telemetry")]
        info!(
            stage = %PaymentStage::RetryingWithProof,
            tx = %receipt.transaction_hash,
            "Replaying request with proof of payment"
        );
        let proof = format!("{PROOF_SCHEME} {}", receipt.transaction_hash);
        let proof = HeaderValue::try_from(proof).map_err(|e| {
            transaction_failed(PaymentStage::RetryingWithProof, receipt.approval_hash, e)
        })?;
        let mut retry = request;
        retry.headers.insert(PROOF_HEADER, proof);
        let response = match self.fetcher.send(&retry).await {
            Ok(response) => response,
            Err(e) => {
                #[cfg(feature = "telemetry")]
                warn!(tx = %receipt.transaction_hash, "Replay failed after payment was spent");
                return Err(e.into());
            }
        };

        if response.status != StatusCode::OK {
            #[cfg(feature = "telemetry")]
            warn!(
                status = %response.status,
                tx = %receipt.transaction_hash,
                "Publisher rejected proof of payment"
            );
            return Err(PaymentError::VerificationFailed {
                transaction_hash: receipt.transaction_hash,
                status: response.status,
            }
            .into());
        }

        Ok(FetchResult {
            content: response.text(),
            status: response.status,
            headers: flatten_headers(&response.headers),
            payment: Some(receipt),
        })
    }

    /// Settles `terms` on chain and returns the receipt used as proof.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingSigner`] before touching the ledger if it
    /// cannot sign, and [`PaymentError`] for every later failure.
    pub async fn pay(&self, terms: &PaymentTerms) -> Result<PaymentReceipt, TachiError> {
        let account = match self.ledger.account() {
            Some(account) if self.ledger.can_sign() => account,
            _ => return Err(ConfigError::MissingSigner.into()),
        };
        let required = terms.amount_in_base_units(USDC_DECIMALS)?;

        #[cfg(feature = "telemetry")]
        info!(
            stage = %PaymentStage::VerifyingFunds,
            amount = %terms.amount,
            currency = %terms.currency,
            recipient = %terms.recipient,
            "Checking balance"
        );
        let available = self
            .ledger
            .balance(terms.token_address, account)
            .await
            .map_err(|e| transaction_failed(PaymentStage::VerifyingFunds, None, e))?;
        if available < required {
            let available = TokenAmount::from_base_units(available, USDC_DECIMALS)
                .map_err(|e| transaction_failed(PaymentStage::VerifyingFunds, None, e))?;
            return Err(PaymentError::InsufficientBalance {
                required: terms.amount,
                available,
            }
            .into());
        }

        let settlement = terms.recipient;
        #[cfg(feature = "telemetry")]
        debug!(stage = %PaymentStage::EnsuringApproval, %settlement, "Checking allowance");
        let approval = self
            .ledger
            .ensure_approval(terms.token_address, account, settlement, required)
            .await
            .map_err(|e| transaction_failed(PaymentStage::EnsuringApproval, None, e))?;
        #[cfg(feature = "telemetry")]
        if let Some(tx_hash) = approval.tx_hash() {
            info!(tx = %tx_hash, "Approval confirmed");
        }

        let instruction = self.settlement_instruction(terms);
        #[cfg(feature = "telemetry")]
        info!(stage = %PaymentStage::SubmittingPayment, ?instruction, "Submitting payment");
        let transaction_hash = self
            .ledger
            .pay(settlement, instruction, required)
            .await
            .map_err(|e| {
                transaction_failed(PaymentStage::SubmittingPayment, approval.tx_hash(), e)
            })?;
        #[cfg(feature = "telemetry")]
        info!(tx = %transaction_hash, "Payment confirmed");

        Ok(PaymentReceipt {
            amount: terms.amount,
            transaction_hash,
            approval_hash: approval.tx_hash(),
        })
    }

    /// Balance of the configured token for the paying account.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingAccount`] if no account is known and
    /// [`TachiError::Network`] if the node cannot be queried.
    pub async fn usdc_balance(&self) -> Result<Balance, TachiError> {
        let account = self.ledger.account().ok_or(ConfigError::MissingAccount)?;
        let rpc_failure = |last_error: String| NetworkError {
            url: self.config.rpc_url.to_string(),
            attempts: 1,
            last_error,
        };
        let base_units = self
            .ledger
            .balance(self.config.token_address(), account)
            .await
            .map_err(|e| rpc_failure(e.to_string()))?;
        let formatted = TokenAmount::from_base_units(base_units, USDC_DECIMALS)
            .map_err(|e| rpc_failure(format!("balance {base_units} out of range: {e}")))?;
        Ok(Balance {
            base_units,
            formatted,
        })
    }

    fn settlement_instruction(&self, terms: &PaymentTerms) -> SettlementInstruction {
        match (terms.token_id, self.config.nft_registry) {
            (Some(token_id), Some(nft_contract)) => SettlementInstruction::PayPublisherByNft {
                nft_contract,
                token_id,
            },
            _ => SettlementInstruction::PayPublisher {
                publisher: self.config.settlement_contract.unwrap_or(terms.recipient),
            },
        }
    }
}

fn unpaid(response: RawResponse) -> FetchResult {
    FetchResult {
        content: response.text(),
        status: response.status,
        headers: flatten_headers(&response.headers),
        payment: None,
    }
}

fn transaction_failed<E>(
    stage: PaymentStage,
    approval_hash: Option<TxHash>,
    source: E,
) -> PaymentError
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[cfg(feature = "telemetry")]
    warn!(%stage, error = %source, "Payment step failed");
    PaymentError::Transaction {
        stage,
        approval_hash,
        source: Box::new(source),
    }
}
