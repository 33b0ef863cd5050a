//! Fixed-point USDC amount type.
//!
//! USDC carries 6 on-chain decimals; this module converts between the
//! human-facing decimal representation and the `U256` base units passed
//! to contracts, and validates free-form user input before any network
//! call is made.

use std::fmt::Display;
use std::str::FromStr;

use alloy::primitives::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// On-chain decimal places of the USDC token contract.
const USDC_DECIMALS: u32 = 6;

/// A USDC dollar amount with at most 6 fractional digits.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Usdc(Decimal);

/// Validation and conversion errors for USDC amounts.
///
/// The input variants are raised before any transaction is submitted
/// and are never retried.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("USDC amount field is empty")]
    Empty,
    #[error("USDC amount must be a number, got {input:?}")]
    NotANumber { input: String },
    #[error("USDC amount must be positive, got {input:?}")]
    NotPositive { input: String },
    #[error("USDC amount {0} has more than {USDC_DECIMALS} decimal places")]
    TooPrecise(Usdc),
    #[error("USDC amount cannot be negative: {0}")]
    Negative(Usdc),
    #[error("value {0} exceeds the representable USDC range")]
    BaseUnitsOverflow(U256),
}

impl Usdc {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Parses a free-form user-supplied amount string.
    ///
    /// Rejects empty input, anything that is not a decimal number,
    /// non-positive values, and values with sub-unit precision the token
    /// cannot represent.
    pub fn parse_user_input(input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let value = Decimal::from_str(trimmed).map_err(|_| AmountError::NotANumber {
            input: trimmed.to_owned(),
        })?;

        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive {
                input: trimmed.to_owned(),
            });
        }

        if value.normalize().scale() > USDC_DECIMALS {
            return Err(AmountError::TooPrecise(Self(value)));
        }

        Ok(Self(value))
    }

    /// Converts to base units (10^-6 USDC) for contract calls.
    ///
    /// Excess precision is an input error rather than something to round
    /// away silently.
    pub fn to_base_units(self) -> Result<U256, AmountError> {
        if self.0.is_sign_negative() {
            return Err(AmountError::Negative(self));
        }

        let mut scaled = self.0.normalize();
        if scaled.scale() > USDC_DECIMALS {
            return Err(AmountError::TooPrecise(self));
        }
        scaled.rescale(USDC_DECIMALS);

        let units: u128 = scaled
            .mantissa()
            .try_into()
            .map_err(|_| AmountError::Negative(self))?;

        Ok(U256::from(units))
    }

    /// Converts base units read from a contract back to a decimal amount.
    pub fn from_base_units(units: U256) -> Result<Self, AmountError> {
        let raw: i128 = units
            .try_into()
            .map_err(|_| AmountError::BaseUnitsOverflow(units))?;

        Decimal::try_from_i128_with_scale(raw, USDC_DECIMALS)
            .map(|value| Self(value.normalize()))
            .map_err(|_| AmountError::BaseUnitsOverflow(units))
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }
}

impl Display for Usdc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Decimal> for Usdc {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<Usdc> for Decimal {
    fn from(value: Usdc) -> Self {
        value.0
    }
}
