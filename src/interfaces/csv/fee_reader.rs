use crate::domain::fee::FeeConfiguration;
use crate::error::{ReconError, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// One row of a fee seed file:
/// `fee_type,percentage,fixed_amount,min_amount,max_amount,is_active`.
#[derive(Debug, Deserialize)]
struct FeeRow {
    fee_type: String,
    percentage: Option<Decimal>,
    fixed_amount: Option<Decimal>,
    min_amount: Option<Decimal>,
    max_amount: Option<Decimal>,
    is_active: Option<bool>,
}

impl TryFrom<FeeRow> for FeeConfiguration {
    type Error = ReconError;

    fn try_from(row: FeeRow) -> Result<Self> {
        if row.fee_type.is_empty() {
            return Err(ReconError::Validation("fee row without fee_type".to_string()));
        }
        let negative = [row.percentage, row.fixed_amount, row.min_amount, row.max_amount]
            .into_iter()
            .flatten()
            .any(|v| v < Decimal::ZERO);
        if negative {
            return Err(ReconError::Validation(format!(
                "fee rule {} has a negative component",
                row.fee_type
            )));
        }
        if let (Some(min), Some(max)) = (row.min_amount, row.max_amount)
            && min > max
        {
            return Err(ReconError::Validation(format!(
                "fee rule {} has min_amount above max_amount",
                row.fee_type
            )));
        }
        Ok(FeeConfiguration {
            fee_type: row.fee_type.to_ascii_uppercase(),
            percentage: row.percentage,
            fixed_amount: row.fixed_amount,
            min_amount: row.min_amount,
            max_amount: row.max_amount,
            is_active: row.is_active.unwrap_or(true),
        })
    }
}

/// Reads fee rules from a CSV source.
pub struct FeeReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> FeeReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    pub fn rules(self) -> impl Iterator<Item = Result<FeeConfiguration>> {
        self.reader
            .into_deserialize::<FeeRow>()
            .map(|row| row.map_err(ReconError::from).and_then(FeeConfiguration::try_from))
    }
}
