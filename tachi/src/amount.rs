//! Exact conversion between human token amounts and on-chain base units.
//!
//! Human amounts are [`Decimal`]s; base units are [`U256`]s. Conversions never
//! go through binary floating point.

use std::fmt;
use std::str::FromStr;

use alloy_primitives::U256;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Decimal precision of USDC on every supported network.
pub const USDC_DECIMALS: u8 = 6;

/// Currency code of the canonical settlement token.
pub const USDC: &str = "USDC";

/// Errors converting between human amounts and base units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    /// Negative amounts cannot be paid.
    #[error("negative amount {0}")]
    Negative(Decimal),
    /// More fractional digits than the token supports.
    #[error("amount {amount} exceeds {decimals} decimal places")]
    Precision {
        /// The offending amount.
        amount: Decimal,
        /// Token decimals.
        decimals: u8,
    },
    /// The value does not fit the target representation.
    #[error("amount out of range")]
    Overflow,
    /// The input is not a decimal number.
    #[error("malformed amount `{0}`")]
    Malformed(String),
}

/// A non-negative token amount in human units (e.g. `1.5` USDC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(Decimal);

impl TokenAmount {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Wraps a decimal, rejecting negative values.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Negative`] for negative input.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying decimal.
    #[must_use]
    pub const fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Builds a human amount from an integer count of base units.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Overflow`] if the value exceeds what a
    /// [`Decimal`] can hold (96-bit mantissa).
    pub fn from_base_units(units: U256, decimals: u8) -> Result<Self, AmountError> {
        let units = u128::try_from(units).map_err(|_| AmountError::Overflow)?;
        let units = i128::try_from(units).map_err(|_| AmountError::Overflow)?;
        Decimal::try_from_i128_with_scale(units, u32::from(decimals))
            .map(Self)
            .map_err(|_| AmountError::Overflow)
    }

    /// Parses an integer string of base units, e.g. the `x402-price` header.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Malformed`] if the string is not an unsigned
    /// integer, or [`AmountError::Overflow`] if it is too large.
    pub fn from_base_units_str(units: &str, decimals: u8) -> Result<Self, AmountError> {
        let trimmed = units.trim();
        let parsed = U256::from_str_radix(trimmed, 10)
            .map_err(|_| AmountError::Malformed(trimmed.to_owned()))?;
        Self::from_base_units(parsed, decimals)
    }

    /// Converts to base units, failing rather than rounding.
    ///
    /// # Errors
    ///
    /// Returns [`AmountError::Precision`] if the amount has more fractional
    /// digits than `decimals`, or [`AmountError::Overflow`].
    pub fn to_base_units(&self, decimals: u8) -> Result<U256, AmountError> {
        let factor = 10u64
            .checked_pow(u32::from(decimals))
            .ok_or(AmountError::Overflow)?;
        let scaled = self
            .0
            .checked_mul(Decimal::from(factor))
            .ok_or(AmountError::Overflow)?;
        if !scaled.fract().is_zero() {
            return Err(AmountError::Precision {
                amount: self.0,
                decimals,
            });
        }
        scaled
            .trunc()
            .to_u128()
            .map(U256::from)
            .ok_or(AmountError::Overflow)
    }
}

impl FromStr for TokenAmount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let value = Decimal::from_str_exact(trimmed)
            .or_else(|_| Decimal::from_scientific(trimmed))
            .map_err(|_| AmountError::Malformed(trimmed.to_owned()))?;
        Self::new(value)
    }
}

impl fmt::Display for TokenAmount {
    /// Formats with trailing zeros trimmed but at least one fractional digit,
    /// so one whole token renders as `1.0`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut normalized = self.0.normalize();
        if normalized.scale() == 0 {
            normalized.rescale(1);
        }
        write!(f, "{normalized}")
    }
}

impl serde::Serialize for TokenAmount {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
