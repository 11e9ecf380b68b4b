//! Outcome of a fetch through the pay-per-crawl client.

use std::collections::HashMap;

use alloy_primitives::TxHash;
use http::{HeaderMap, StatusCode};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::amount::TokenAmount;

/// Proof that a fetch was paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Amount paid, in human units.
    pub amount: TokenAmount,
    /// Hash of the settlement transaction sent as proof.
    pub transaction_hash: TxHash,
    /// Hash of the approval sent before settlement, if one was needed.
    pub approval_hash: Option<TxHash>,
}

/// Final response of a fetch, paid or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResult {
    /// Response body as text.
    pub content: String,
    /// Status of the final response.
    pub status: StatusCode,
    /// Response headers; repeated headers are joined with `", "`.
    pub headers: HashMap<String, String>,
    /// Present if and only if the content was paid for.
    pub payment: Option<PaymentReceipt>,
}

impl FetchResult {
    /// Whether the server demanded payment before serving the content.
    #[must_use]
    pub const fn payment_required(&self) -> bool {
        self.payment.is_some()
    }

    /// Amount paid, if payment occurred.
    #[must_use]
    pub fn payment_amount(&self) -> Option<TokenAmount> {
        self.payment.map(|p| p.amount)
    }

    /// Settlement transaction hash, if payment occurred.
    #[must_use]
    pub fn transaction_hash(&self) -> Option<TxHash> {
        self.payment.map(|p| p.transaction_hash)
    }
}

/// Flattens a header map into unique keys.
#[must_use]
pub fn flatten_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}

impl Serialize for FetchResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FetchResult", 6)?;
        s.serialize_field("content", &self.content)?;
        s.serialize_field("statusCode", &self.status.as_u16())?;
        s.serialize_field("headers", &self.headers)?;
        s.serialize_field("paymentRequired", &self.payment_required())?;
        s.serialize_field("paymentAmount", &self.payment_amount())?;
        s.serialize_field("transactionHash", &self.transaction_hash())?;
        s.end()
    }
}
