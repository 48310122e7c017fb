//! Fixed-point monetary amounts
//!
//! `Money` wraps `rust_decimal::Decimal` and pins every value to four fractional
//! digits. Arithmetic is exact; there is no floating point anywhere in the path.
//!
//! The balance cache stores balances as integer minor units (1/10000) inside an
//! atomic cell, so `Money` also converts to and from `i64` minor units.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// An exact decimal amount with a fixed scale of 4.
///
/// Ordering and equality are total and scale-independent: `1.5` and `1.5000`
/// are the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits carried by every amount.
    pub const SCALE: u32 = 4;

    pub const ZERO: Self = Money(Decimal::ZERO);

    /// Create a `Money` from a `Decimal`, normalizing to 4 fractional digits.
    ///
    /// Values with more precision are rounded (banker's rounding); use
    /// [`Money::from_str`] when extra digits must be rejected instead.
    pub fn new(value: Decimal) -> Self {
        let mut normalized = value.round_dp(Self::SCALE);
        normalized.rescale(Self::SCALE);
        Money(normalized)
    }

    /// Build an amount from integer minor units, e.g. `from_minor_units(15000)` is `1.5000`.
    pub fn from_minor_units(units: i64) -> Self {
        Money(Decimal::new(units, Self::SCALE))
    }

    /// Integer minor units, or `None` if the value does not fit in an `i64`.
    pub fn to_minor_units(self) -> Option<i64> {
        let mut value = self.0;
        value.rescale(Self::SCALE);
        // rescale silently keeps a smaller scale when the mantissa cannot grow
        if value.scale() != Self::SCALE {
            return None;
        }
        i64::try_from(value.mantissa()).ok()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Money::new)
    }

    /// Subtract `rhs`, returning `None` when the result would be negative.
    ///
    /// Balances can never go below zero, so a negative difference is a distinct
    /// outcome rather than a value.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        if rhs > self {
            return None;
        }
        self.0.checked_sub(rhs.0).map(Money::new)
    }
}

/// Error returned when parsing an amount string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseMoneyError {
    #[error("'{0}' is not a decimal number")]
    Malformed(String),

    #[error("'{0}' has more than 4 fractional digits")]
    TooPrecise(String),
}

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let decimal =
            Decimal::from_str(trimmed).map_err(|_| ParseMoneyError::Malformed(trimmed.into()))?;
        if decimal.normalize().scale() > Self::SCALE {
            return Err(ParseMoneyError::TooPrecise(trimmed.into()));
        }
        Ok(Money::new(decimal))
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Money::from_str(&s).map_err(serde::de::Error::custom)
    }
}
