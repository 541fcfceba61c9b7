//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Price levels are matched by exact decimal equality, so `100`, `100.0`
//! and `100.00` address the same level.

use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when constructing numeric values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("Invalid decimal literal: {0}")]
    Parse(String),

    #[error("Price must be strictly positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Quantity must not be negative, got {0}")]
    NegativeQuantity(Decimal),
}

/// A strictly positive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None if not strictly positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Create a price from a whole number
    ///
    /// # Panics
    /// Panics if `value` is zero
    pub fn from_u64(value: u64) -> Self {
        assert!(value > 0, "Price must be strictly positive");
        Self(Decimal::from(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or(NumericError::NonPositivePrice(value))
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl FromStr for Price {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_from(value)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A non-negative size or quantity. Zero is meaningful: a zero-size delta
/// removes a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    /// Create a quantity, returning None if negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Subtract, flooring at zero
    pub fn saturating_sub(self, rhs: Quantity) -> Quantity {
        if rhs.0 >= self.0 {
            Quantity::ZERO
        } else {
            Quantity(self.0 - rhs.0)
        }
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = NumericError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::try_new(value).ok_or(NumericError::NegativeQuantity(value))
    }
}

impl From<Quantity> for Decimal {
    fn from(quantity: Quantity) -> Self {
        quantity.0
    }
}

impl FromStr for Quantity {
    type Err = NumericError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str_exact(s).map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_from(value)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Quantity {
        Quantity(self.0 + rhs.0)
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    /// Floors at zero; use [`Quantity::saturating_sub`] to make that explicit.
    fn sub(self, rhs: Quantity) -> Quantity {
        self.saturating_sub(rhs)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_price_rejects_non_positive() {
        assert!(Price::try_new(Decimal::ZERO).is_none());
        assert!(Price::try_new(Decimal::from(-1)).is_none());
        assert!(Price::try_new(Decimal::from(1)).is_some());
    }

    #[test]
    fn test_price_equality_ignores_trailing_zeros() {
        let a = Price::from_str("100").unwrap();
        let b = Price::from_str("100.00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
    }

    #[test]
    fn test_quantity_parse() {
        let q = Quantity::from_str("2.5").unwrap();
        assert_eq!(q.as_decimal(), Decimal::from_str_exact("2.5").unwrap());
        assert!(Quantity::from_str("-1").is_err());
        assert!(matches!(Quantity::from_str("abc"), Err(NumericError::Parse(_))));
    }

    #[test]
    fn test_quantity_zero_is_valid() {
        let q = Quantity::from_str("0").unwrap();
        assert!(q.is_zero());
    }

    #[test]
    fn test_quantity_saturating_sub() {
        let a = Quantity::from_u64(3);
        let b = Quantity::from_u64(5);
        assert_eq!(a - b, Quantity::ZERO);
        assert_eq!(b - a, Quantity::from_u64(2));
    }

    #[test]
    fn test_price_serialization_rejects_zero() {
        let err = serde_json::from_str::<Price>("\"0\"");
        assert!(err.is_err());

        let ok: Price = serde_json::from_str("\"101.5\"").unwrap();
        assert_eq!(ok, Price::from_str("101.5").unwrap());
    }

    proptest! {
        #[test]
        fn prop_price_roundtrips_through_string(units in 1u64..10_000_000, scale in 0u32..8) {
            let value = Decimal::new(units as i64, scale);
            let price = Price::try_new(value).unwrap();
            let reparsed = Price::from_str(&price.to_string()).unwrap();
            prop_assert_eq!(price, reparsed);
        }
    }
}
