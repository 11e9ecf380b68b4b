//! HTTP-specific constants for the Tachi protocol.

use http::header::{AUTHORIZATION, HeaderName};

/// Status a publisher answers with when a resource must be paid for.
pub const HTTP_STATUS_PAYMENT_REQUIRED: u16 = 402;

/// Header carrying the proof of payment on the replayed request.
pub const PROOF_HEADER: HeaderName = AUTHORIZATION;

/// Authorization scheme of the proof of payment.
pub const PROOF_SCHEME: &str = "Bearer";
