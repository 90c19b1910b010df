use super::event::Provider;
use crate::error::{ReconError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fee type of the provider-agnostic funding row.
pub const GENERIC_FUNDING: &str = "FUNDING";

/// Fee type of a provider-specific funding row, e.g. `FUNDING_PAYSTACK`.
pub fn funding_fee_type(provider: &Provider) -> String {
    format!(
        "{}_{}",
        GENERIC_FUNDING,
        provider.as_str().to_ascii_uppercase().replace('-', "_")
    )
}

/// A fee rule. `percentage` is expressed in percent, so `10` means 10 %.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FeeConfiguration {
    pub fee_type: String,
    pub percentage: Option<Decimal>,
    pub fixed_amount: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    pub is_active: bool,
}

impl FeeConfiguration {
    pub fn percentage(fee_type: impl Into<String>, percentage: Decimal) -> Self {
        Self {
            fee_type: fee_type.into(),
            percentage: Some(percentage),
            fixed_amount: None,
            min_amount: None,
            max_amount: None,
            is_active: true,
        }
    }

    pub fn fixed(fee_type: impl Into<String>, fixed_amount: Decimal) -> Self {
        Self {
            fee_type: fee_type.into(),
            percentage: None,
            fixed_amount: Some(fixed_amount),
            min_amount: None,
            max_amount: None,
            is_active: true,
        }
    }

    pub fn with_bounds(mut self, min_amount: Option<Decimal>, max_amount: Option<Decimal>) -> Self {
        self.min_amount = min_amount;
        self.max_amount = max_amount;
        self
    }

    /// `amount * percentage / 100 + fixed`, clamped to the configured bounds and
    /// rounded half away from zero to `scale` decimal places.
    ///
    /// Fails with a validation error when the result does not fit in a `Decimal`.
    pub fn compute(&self, amount: Decimal, scale: u32) -> Result<Decimal> {
        let overflow = || {
            ReconError::Validation(format!(
                "fee rule {} overflows on amount {}",
                self.fee_type, amount
            ))
        };
        let variable = match self.percentage {
            Some(pct) => amount
                .checked_mul(pct)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .ok_or_else(overflow)?,
            None => Decimal::ZERO,
        };
        let mut fee = variable
            .checked_add(self.fixed_amount.unwrap_or(Decimal::ZERO))
            .ok_or_else(overflow)?;

        if let Some(min) = self.min_amount {
            fee = fee.max(min);
        }
        if let Some(max) = self.max_amount {
            fee = fee.min(max);
        }

        Ok(fee
            .max(Decimal::ZERO)
            .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero))
    }
}
