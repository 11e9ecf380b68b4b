//! Settlement terms carried by a `402 Payment Required` response.
//!
//! Terms are read from dedicated `x402-*` response headers first. Fields the
//! headers do not carry fall back to the nested `payment` object of a JSON
//! body:
//!
//! ```json
//! { "payment": { "amount": "0.01", "currency": "USDC", "network": "Base",
//!                "chainId": 8453, "recipient": "0x…", "tokenAddress": "0x…",
//!                "tokenId": "7" } }
//! ```
//!
//! Everything that was read is kept in [`RawPaymentTerms`] so that a rejected
//! response can be diagnosed. Only validated [`PaymentTerms`] leave the parser.

use alloy_primitives::{Address, U256};
use http::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::amount::{TokenAmount, USDC, USDC_DECIMALS};
use crate::error::{InvalidTermsReason, PaymentError};
use crate::networks::BASE_MAINNET;

/// Header carrying the price in token base units.
pub const PRICE_HEADER: &str = "x402-price";

/// Header carrying the settlement currency code.
pub const CURRENCY_HEADER: &str = "x402-currency";

/// Header carrying the settlement recipient address.
pub const RECIPIENT_HEADER: &str = "x402-recipient";

/// Header carrying the token contract address.
pub const CONTRACT_HEADER: &str = "x402-contract";

/// Header carrying the numeric chain id.
pub const CHAIN_ID_HEADER: &str = "x402-chain-id";

/// Network name assumed when the response does not name one.
pub const DEFAULT_NETWORK_NAME: &str = "Base";

/// Settlement fields exactly as found in a 402 response, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPaymentTerms {
    /// `x402-price` header (base units).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    /// `payment.amount` from the body (human units).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    /// Currency code from header or body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// Network name from the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    /// Chain id from header or body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    /// Recipient from header or body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Token contract from header or body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    /// Token/NFT id from the body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
}

impl RawPaymentTerms {
    /// Collects settlement fields from response headers and body.
    ///
    /// A body that is not JSON, or has no `payment` object, contributes
    /// nothing.
    #[must_use]
    pub fn extract(headers: &HeaderMap, body: &[u8]) -> Self {
        let body: Value = serde_json::from_slice(body).unwrap_or(Value::Null);
        let payment = body.get("payment");
        let from_body = |key: &str| payment.and_then(|p| p.get(key)).and_then(value_to_string);

        Self {
            price: header_value(headers, PRICE_HEADER),
            amount: from_body("amount"),
            currency: header_value(headers, CURRENCY_HEADER).or_else(|| from_body("currency")),
            network: from_body("network"),
            chain_id: header_value(headers, CHAIN_ID_HEADER).or_else(|| from_body("chainId")),
            recipient: header_value(headers, RECIPIENT_HEADER)
                .or_else(|| from_body("recipient")),
            token_address: header_value(headers, CONTRACT_HEADER)
                .or_else(|| from_body("tokenAddress")),
            token_id: from_body("tokenId"),
        }
    }

    /// Validates the raw fields into [`PaymentTerms`].
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidTerms`] carrying `self` when the
    /// recipient or token address is missing or malformed, or when the
    /// amount, chain id or token id cannot be read.
    pub fn validate(self) -> Result<PaymentTerms, PaymentError> {
        match self.try_validate() {
            Ok(terms) => Ok(terms),
            Err(reason) => Err(PaymentError::invalid_terms(reason, self)),
        }
    }

    fn try_validate(&self) -> Result<PaymentTerms, InvalidTermsReason> {
        let currency = self.currency.clone().unwrap_or_else(|| USDC.to_owned());
        let is_usdc = currency.eq_ignore_ascii_case(USDC);

        let amount = match (&self.price, &self.amount) {
            (Some(price), _) if is_usdc => TokenAmount::from_base_units_str(price, USDC_DECIMALS)
                .map_err(|_| InvalidTermsReason::InvalidAmount(price.clone()))?,
            (Some(price), _) => price
                .parse()
                .map_err(|_| InvalidTermsReason::InvalidAmount(price.clone()))?,
            (None, Some(amount)) => amount
                .parse()
                .map_err(|_| InvalidTermsReason::InvalidAmount(amount.clone()))?,
            (None, None) => TokenAmount::ZERO,
        };

        let chain_id = match &self.chain_id {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map_err(|_| InvalidTermsReason::InvalidChainId(raw.clone()))?,
            None => BASE_MAINNET,
        };

        let recipient = match &self.recipient {
            None => return Err(InvalidTermsReason::MissingRecipient),
            Some(raw) => {
                parse_address(raw).ok_or_else(|| InvalidTermsReason::InvalidRecipient(raw.clone()))?
            }
        };

        let token_address = match &self.token_address {
            None => return Err(InvalidTermsReason::MissingTokenAddress),
            Some(raw) => parse_address(raw)
                .ok_or_else(|| InvalidTermsReason::InvalidTokenAddress(raw.clone()))?,
        };

        let token_id = self
            .token_id
            .as_ref()
            .map(|raw| {
                U256::from_str_radix(raw.trim(), 10)
                    .map_err(|_| InvalidTermsReason::InvalidTokenId(raw.clone()))
            })
            .transpose()?;

        Ok(PaymentTerms {
            amount,
            currency,
            network: self
                .network
                .clone()
                .unwrap_or_else(|| DEFAULT_NETWORK_NAME.to_owned()),
            chain_id,
            recipient,
            token_address,
            token_id,
        })
    }
}

/// Validated settlement terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTerms {
    /// Price in human units.
    pub amount: TokenAmount,
    /// Currency code, e.g. `USDC`.
    pub currency: String,
    /// Network name as announced by the server.
    pub network: String,
    /// Numeric chain id.
    pub chain_id: u64,
    /// Settlement recipient.
    pub recipient: Address,
    /// Token contract used for payment.
    pub token_address: Address,
    /// Optional token/NFT identifier of the publisher.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<U256>,
}

impl PaymentTerms {
    /// Parses and validates the terms of a 402 response.
    ///
    /// # Errors
    ///
    /// See [`RawPaymentTerms::validate`].
    pub fn parse(headers: &HeaderMap, body: &[u8]) -> Result<Self, PaymentError> {
        let raw = RawPaymentTerms::extract(headers, body);
        #[cfg(feature = "telemetry")]
        tracing::debug!(terms = ?raw, "Extracted payment terms");
        raw.validate()
    }

    /// Returns the price in base units for a token with `decimals` places.
    ///
    /// # Errors
    ///
    /// Returns [`PaymentError::InvalidTerms`] if the price cannot be expressed
    /// exactly in base units.
    pub fn amount_in_base_units(&self, decimals: u8) -> Result<U256, PaymentError> {
        self.amount.to_base_units(decimals).map_err(|_| {
            PaymentError::invalid_terms(
                InvalidTermsReason::ExcessPrecision {
                    amount: self.amount.to_string(),
                    decimals,
                },
                self.to_raw(),
            )
        })
    }

    fn to_raw(&self) -> RawPaymentTerms {
        RawPaymentTerms {
            price: None,
            amount: Some(self.amount.to_string()),
            currency: Some(self.currency.clone()),
            network: Some(self.network.clone()),
            chain_id: Some(self.chain_id.to_string()),
            recipient: Some(self.recipient.to_checksum(None)),
            token_address: Some(self.token_address.to_checksum(None)),
            token_id: self.token_id.map(|id| id.to_string()),
        }
    }
}

/// Parses an EIP-55 shaped address: `0x` followed by 40 hex digits.
///
/// Mixed-case input must carry a valid checksum; all-lowercase or
/// all-uppercase input is accepted as is.
#[must_use]
pub fn parse_address(raw: &str) -> Option<Address> {
    let raw = raw.trim();
    let hex = raw.strip_prefix("0x")?;
    if hex.len() != 40 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let has_lower = hex.bytes().any(|b| b.is_ascii_lowercase());
    let has_upper = hex.bytes().any(|b| b.is_ascii_uppercase());
    if has_lower && has_upper {
        Address::parse_checksummed(raw, None).ok()
    } else {
        raw.parse().ok()
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
