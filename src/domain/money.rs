use crate::error::ReconError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Smallest number of decimal places a monetary value is carried at.
pub const MIN_MONEY_SCALE: u32 = 2;

/// A wallet balance.
///
/// This is a wrapper around `rust_decimal::Decimal` so balance arithmetic stays exact
/// and cannot be confused with a raw transaction amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive monetary amount carried by a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, ReconError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ReconError::Validation(format!(
                "Amount must be positive, got {}",
                value
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Number of decimal places the amount is expressed in, never below two.
    pub fn scale(&self) -> u32 {
        self.0.scale().max(MIN_MONEY_SCALE)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ReconError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// `None` on overflow.
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_balance_arithmetic() {
        let b1 = Balance::new(dec!(10.0));
        let b2 = Balance::new(dec!(5.0));
        assert_eq!(b1 + b2, Balance::new(dec!(15.0)));
        assert_eq!(b1 - b2, Balance::new(dec!(5.0)));
        assert_eq!(b1.checked_add(b2), Some(Balance::new(dec!(15.0))));
        assert_eq!(Balance::new(Decimal::MAX).checked_add(b2), None);
    }

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(ReconError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(ReconError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_scale_has_floor() {
        assert_eq!(Amount::new(dec!(1000)).unwrap().scale(), 2);
        assert_eq!(Amount::new(dec!(0.0001)).unwrap().scale(), 4);
    }

    #[test]
    fn test_amount_rejects_non_positive_on_deserialize() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-3.50\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"3.50\"").unwrap();
        assert_eq!(parsed.value(), dec!(3.50));
    }
}
