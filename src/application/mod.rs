//! Application layer: the webhook reconciliation pipeline.
//!
//! `ReconciliationEngine` is the entry point. It chains signature verification,
//! payload normalization, duplicate detection, fee calculation and the ledger
//! update, and turns the outcome into a `ReconciliationResult`.

pub mod duplicate;
pub mod engine;
pub mod fee_calculator;
pub mod ledger;
pub mod normalizer;
pub mod result;
pub mod signature;
