//! [`Ledger`] implementation for EIP-155 chains.
//!
//! Transactions are legacy-priced: the gas price comes from `eth_gasPrice`,
//! the gas limit is a fixed constant per call, and the nonce is queried from
//! the node immediately before each submission. Nothing is cached between
//! calls.

use std::future::Future;

use alloy_network::{EthereumWallet, TransactionBuilder};
use alloy_primitives::{Address, Bytes, TxHash, U256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolCall;
use tachi::config::TachiConfig;
use tachi::error::ConfigError;
use tachi::ledger::{Ledger, SettlementInstruction};

use crate::contract::{IERC20, IPaymentProcessor};
use crate::error::LedgerError;

/// Gas limit for ERC-20 `approve`.
pub const APPROVE_GAS_LIMIT: u64 = 100_000;

/// Gas limit for settlement calls.
pub const PAY_GAS_LIMIT: u64 = 200_000;

/// Awaits a future, optionally instrumenting it with a tracing span.
macro_rules! traced {
    ($fut:expr, $span:expr) => {{
        #[cfg(feature = "telemetry")]
        {
            use tracing::Instrument;
            $fut.instrument($span).await
        }
        #[cfg(not(feature = "telemetry"))]
        {
            $fut.await
        }
    }};
}

/// Ledger client talking JSON-RPC to an EVM node.
///
/// Built with a signing credential it can submit approvals and payments.
/// Built with only an account address it is read-only: balance and allowance
/// queries work, submissions fail with [`LedgerError::SignerRequired`].
#[derive(Debug, Clone)]
pub struct Eip155Ledger {
    provider: DynProvider,
    chain_id: u64,
    signer: Option<Address>,
    account: Option<Address>,
}

impl Eip155Ledger {
    /// Connects to the RPC endpoint of `config`.
    ///
    /// No request is made; use [`check_connection`](Self::check_connection)
    /// to probe the node.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrivateKey`] if the signing credential
    /// cannot be decoded.
    pub fn connect(config: &TachiConfig) -> Result<Self, ConfigError> {
        let signer = config
            .private_key
            .as_deref()
            .map(|key| {
                key.parse::<PrivateKeySigner>()
                    .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))
            })
            .transpose()?;
        let signer_address = signer.as_ref().map(PrivateKeySigner::address);

        let provider = match signer {
            Some(signer) => ProviderBuilder::default()
                .wallet(EthereumWallet::from(signer))
                .connect_http(config.rpc_url.clone())
                .erased(),
            None => ProviderBuilder::default()
                .connect_http(config.rpc_url.clone())
                .erased(),
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(
            network = %config.network,
            chain_id = config.chain_id(),
            rpc_url = %config.rpc_url,
            signer = ?signer_address,
            "Using EVM ledger"
        );

        Ok(Self {
            provider,
            chain_id: config.chain_id(),
            signer: signer_address,
            account: signer_address.or(config.account_address),
        })
    }

    /// Chain id transactions are signed for.
    #[must_use]
    pub const fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Underlying provider.
    #[must_use]
    pub const fn provider(&self) -> &DynProvider {
        &self.provider
    }

    /// Asks the node for its chain id and compares it with the configured one.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Transport`] if the node is unreachable and
    /// [`LedgerError::ChainMismatch`] if it serves another chain.
    pub async fn check_connection(&self) -> Result<(), LedgerError> {
        let actual = self.provider.get_chain_id().await?;
        if actual != self.chain_id {
            return Err(LedgerError::ChainMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Signs and submits a call, then blocks until it is mined.
    async fn send(
        &self,
        to: Address,
        calldata: Bytes,
        gas_limit: u64,
    ) -> Result<TxHash, LedgerError> {
        let from = self.signer.ok_or(LedgerError::SignerRequired)?;

        let gas_price_fut = self.provider.get_gas_price().into_future();
        let gas_price = traced!(gas_price_fut, tracing::info_span!("get_gas_price"))?;
        let nonce_fut = self
            .provider
            .get_transaction_count(from)
            .pending()
            .into_future();
        let nonce = traced!(
            nonce_fut,
            tracing::info_span!("get_transaction_count", %from)
        )?;

        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_input(calldata)
            .with_nonce(nonce)
            .with_gas_limit(gas_limit)
            .with_gas_price(gas_price)
            .with_chain_id(self.chain_id);

        let pending = self.provider.send_transaction(request).await?;
        #[cfg(feature = "telemetry")]
        tracing::info!(
            tx = %pending.tx_hash(),
            nonce,
            %gas_price,
            "Transaction submitted, awaiting receipt"
        );

        let receipt = traced!(
            pending.get_receipt(),
            tracing::info_span!("get_receipt", %to)
        )?;
        if receipt.status() {
            #[cfg(feature = "telemetry")]
            tracing::info!(tx = %receipt.transaction_hash, "Transaction confirmed");
            Ok(receipt.transaction_hash)
        } else {
            #[cfg(feature = "telemetry")]
            tracing::warn!(tx = %receipt.transaction_hash, "Transaction reverted");
            Err(LedgerError::Reverted {
                tx_hash: receipt.transaction_hash,
            })
        }
    }
}

impl Ledger for Eip155Ledger {
    type Error = LedgerError;

    fn account(&self) -> Option<Address> {
        self.account
    }

    fn can_sign(&self) -> bool {
        self.signer.is_some()
    }

    fn balance(
        &self,
        token: Address,
        account: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send {
        async move {
            let contract = IERC20::new(token, self.provider.clone());
            let balance = contract.balanceOf(account).call().await?;
            Ok(balance)
        }
    }

    fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> impl Future<Output = Result<U256, Self::Error>> + Send {
        async move {
            let contract = IERC20::new(token, self.provider.clone());
            let allowance = contract.allowance(owner, spender).call().await?;
            Ok(allowance)
        }
    }

    fn approve(
        &self,
        token: Address,
        spender: Address,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send {
        let calldata = IERC20::approveCall { spender, amount }.abi_encode();
        self.send(token, calldata.into(), APPROVE_GAS_LIMIT)
    }

    fn pay(
        &self,
        settlement: Address,
        instruction: SettlementInstruction,
        amount: U256,
    ) -> impl Future<Output = Result<TxHash, Self::Error>> + Send {
        let calldata = match instruction {
            SettlementInstruction::PayPublisher { publisher } => {
                IPaymentProcessor::payPublisherCall { publisher, amount }.abi_encode()
            }
            SettlementInstruction::PayPublisherByNft {
                nft_contract,
                token_id,
            } => IPaymentProcessor::payPublisherByNFTCall {
                nftContract: nft_contract,
                tokenId: token_id,
                amount,
            }
            .abi_encode(),
        };
        self.send(settlement, calldata.into(), PAY_GAS_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    use alloy_consensus::{Transaction, TxEnvelope};
    use alloy_network::eip2718::Decodable2718;
    use alloy_primitives::{address, hex, keccak256};
    use tachi::networks::Network;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    const TEST_KEY: &str = "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";
    const TOKEN: Address = address!("036CbD53842c5426634e7929541eC2318f3dCF7e");
    const SETTLEMENT: Address = address!("2222222222222222222222222222222222222222");
    const SUBMISSION_METHODS: [&str; 4] = [
        "eth_gasPrice",
        "eth_getTransactionCount",
        "eth_sendRawTransaction",
        "eth_getTransactionReceipt",
    ];

    /// Answers JSON-RPC requests by method name, echoing the request id.
    ///
    /// The pending nonce counts the raw transactions received so far.
    struct RpcNode {
        chain_id: u64,
        call_result: u64,
        reverted: bool,
        submitted: AtomicU64,
    }

    impl RpcNode {
        fn new(chain_id: u64, call_result: u64) -> Self {
            Self {
                chain_id,
                call_result,
                reverted: false,
                submitted: AtomicU64::new(0),
            }
        }

        fn reverting(mut self) -> Self {
            self.reverted = true;
            self
        }

        fn result(&self, method: &str, params: &serde_json::Value) -> Option<serde_json::Value> {
            let result = match method {
                "eth_chainId" => serde_json::json!(format!("0x{:x}", self.chain_id)),
                "eth_call" => serde_json::json!(format!("0x{:064x}", self.call_result)),
                "eth_gasPrice" => serde_json::json!("0x3b9aca00"),
                "eth_blockNumber" => serde_json::json!("0x1"),
                "eth_getTransactionCount" => {
                    assert_eq!(params[1], "pending");
                    let nonce = self.submitted.load(Ordering::SeqCst);
                    serde_json::json!(format!("0x{nonce:x}"))
                }
                "eth_sendRawTransaction" => {
                    let raw = hex::decode(params[0].as_str().unwrap()).unwrap();
                    self.submitted.fetch_add(1, Ordering::SeqCst);
                    serde_json::json!(keccak256(raw))
                }
                "eth_getTransactionReceipt" => {
                    let status = if self.reverted { "0x0" } else { "0x1" };
                    serde_json::json!({
                        "type": "0x0",
                        "status": status,
                        "cumulativeGasUsed": "0xb4d0",
                        "logs": [],
                        "logsBloom": format!("0x{}", "00".repeat(256)),
                        "transactionHash": params[0],
                        "transactionIndex": "0x0",
                        "blockHash": format!("0x{}", "11".repeat(32)),
                        "blockNumber": "0x1",
                        "gasUsed": "0xb4d0",
                        "effectiveGasPrice": "0x3b9aca00",
                        "from": Address::ZERO,
                        "to": TOKEN,
                        "contractAddress": null,
                    })
                }
                _ => return None,
            };
            Some(result)
        }
    }

    impl Respond for RpcNode {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: serde_json::Value = request.body_json().unwrap();
            let method = body["method"].as_str().unwrap();
            let reply = match self.result(method, &body["params"]) {
                Some(result) => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "result": result,
                }),
                None => serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": body["id"],
                    "error": { "code": -32601, "message": "method not found" },
                }),
            };
            ResponseTemplate::new(200).set_body_json(reply)
        }
    }

    async fn serve(rpc: RpcNode) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(rpc)
            .mount(&server)
            .await;
        server
    }

    async fn node(chain_id: u64, call_result: u64) -> MockServer {
        serve(RpcNode::new(chain_id, call_result)).await
    }

    fn config(server: &MockServer) -> TachiConfig {
        TachiConfig::new(Network::BaseSepolia, server.uri().parse().unwrap())
    }

    fn signing_config(server: &MockServer) -> TachiConfig {
        config(server).with_private_key(TEST_KEY)
    }

    /// Submission-related RPC methods in the order the node received them.
    async fn submission_methods(server: &MockServer) -> Vec<String> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|request| {
                let body: serde_json::Value = request.body_json().unwrap();
                body["method"].as_str().unwrap().to_owned()
            })
            .filter(|method| SUBMISSION_METHODS.contains(&method.as_str()))
            .collect()
    }

    /// Signed transactions the node received, decoded.
    async fn raw_transactions(server: &MockServer) -> Vec<TxEnvelope> {
        server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .filter_map(|request| {
                let body: serde_json::Value = request.body_json().unwrap();
                (body["method"] == "eth_sendRawTransaction")
                    .then(|| hex::decode(body["params"][0].as_str().unwrap()).unwrap())
            })
            .map(|raw| TxEnvelope::decode_2718(&mut raw.as_slice()).unwrap())
            .collect()
    }

    #[test]
    fn test_connect_with_key_derives_account() {
        let config = TachiConfig::base_sepolia("http://localhost:8545".parse().unwrap())
            .with_private_key(TEST_KEY);
        let ledger = Eip155Ledger::connect(&config).unwrap();
        assert!(ledger.can_sign());
        assert_eq!(
            ledger.account(),
            Some(address!("90F8bf6A479f320ead074411a4B0e7944Ea8c9C1"))
        );
        assert_eq!(ledger.chain_id(), 84532);
    }

    #[test]
    fn test_connect_rejects_malformed_key() {
        let config = TachiConfig::base_sepolia("http://localhost:8545".parse().unwrap())
            .with_private_key("0xnothex");
        let err = Eip155Ledger::connect(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrivateKey(_)));
    }

    #[test]
    fn test_read_only_ledger_uses_configured_account() {
        let account = address!("1111111111111111111111111111111111111111");
        let config = TachiConfig::base_sepolia("http://localhost:8545".parse().unwrap())
            .with_account_address(account);
        let ledger = Eip155Ledger::connect(&config).unwrap();
        assert!(!ledger.can_sign());
        assert_eq!(ledger.account(), Some(account));
    }

    #[tokio::test]
    async fn test_submission_without_signer_fails_before_rpc() {
        let server = MockServer::start().await;
        let ledger = Eip155Ledger::connect(&config(&server)).unwrap();

        let err = ledger
            .approve(TOKEN, Address::ZERO, U256::from(1_000_000u64))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::SignerRequired));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_balance_decodes_eth_call() {
        let server = node(84532, 2_000_000).await;
        let ledger = Eip155Ledger::connect(&config(&server)).unwrap();

        let balance = ledger.balance(TOKEN, Address::ZERO).await.unwrap();
        assert_eq!(balance, U256::from(2_000_000u64));
    }

    #[tokio::test]
    async fn test_allowance_decodes_eth_call() {
        let server = node(84532, 0).await;
        let ledger = Eip155Ledger::connect(&config(&server)).unwrap();

        let allowance = ledger
            .allowance(TOKEN, Address::ZERO, Address::repeat_byte(9))
            .await
            .unwrap();
        assert_eq!(allowance, U256::ZERO);
    }

    #[tokio::test]
    async fn test_check_connection_matches_chain() {
        let server = node(84532, 0).await;
        let ledger = Eip155Ledger::connect(&config(&server)).unwrap();
        ledger.check_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_check_connection_detects_wrong_chain() {
        let server = node(8453, 0).await;
        let ledger = Eip155Ledger::connect(&config(&server)).unwrap();

        let err = ledger.check_connection().await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ChainMismatch {
                expected: 84532,
                actual: 8453
            }
        ));
    }

    #[test]
    fn test_pay_by_nft_encodes_registry_call() {
        let call = IPaymentProcessor::payPublisherByNFTCall {
            nftContract: Address::repeat_byte(7),
            tokenId: U256::from(42u64),
            amount: U256::from(1_000_000u64),
        };
        let encoded = call.abi_encode();
        assert_eq!(&encoded[..4], IPaymentProcessor::payPublisherByNFTCall::SELECTOR);
        assert_eq!(encoded.len(), 4 + 3 * 32);
    }

    #[tokio::test]
    async fn test_approve_then_pay_queries_nonce_before_each_submission() {
        let server = node(84532, 0).await;
        let ledger = Eip155Ledger::connect(&signing_config(&server)).unwrap();
        let amount = U256::from(1_000_000u64);

        let approve_hash = ledger.approve(TOKEN, SETTLEMENT, amount).await.unwrap();
        let pay_hash = ledger
            .pay(
                SETTLEMENT,
                SettlementInstruction::PayPublisher {
                    publisher: Address::repeat_byte(0x11),
                },
                amount,
            )
            .await
            .unwrap();

        let once = SUBMISSION_METHODS.map(str::to_owned);
        assert_eq!(submission_methods(&server).await, [once.clone(), once].concat());

        let transactions = raw_transactions(&server).await;
        assert_eq!(transactions.len(), 2);
        let (approve, pay) = (&transactions[0], &transactions[1]);
        assert_eq!(approve.tx_hash(), &approve_hash);
        assert_eq!(approve.to(), Some(TOKEN));
        assert_eq!(approve.gas_limit(), APPROVE_GAS_LIMIT);
        assert_eq!(approve.nonce(), 0);
        assert_eq!(approve.gas_price(), Some(1_000_000_000));
        assert_eq!(approve.chain_id(), Some(84532));
        assert_eq!(
            approve.input().as_ref(),
            IERC20::approveCall {
                spender: SETTLEMENT,
                amount
            }
            .abi_encode()
            .as_slice()
        );

        assert_eq!(pay.tx_hash(), &pay_hash);
        assert_eq!(pay.to(), Some(SETTLEMENT));
        assert_eq!(pay.gas_limit(), PAY_GAS_LIMIT);
        assert_eq!(pay.nonce(), 1);
        assert_eq!(
            &pay.input()[..4],
            IPaymentProcessor::payPublisherCall::SELECTOR.as_slice()
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_an_error() {
        let server = serve(RpcNode::new(84532, 0).reverting()).await;
        let ledger = Eip155Ledger::connect(&signing_config(&server)).unwrap();

        let err = ledger
            .approve(TOKEN, SETTLEMENT, U256::from(1u64))
            .await
            .unwrap_err();

        let transactions = raw_transactions(&server).await;
        assert_eq!(transactions.len(), 1);
        match err {
            LedgerError::Reverted { tx_hash } => {
                assert_eq!(&tx_hash, transactions[0].tx_hash());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
