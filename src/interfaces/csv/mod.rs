//! CSV seed files for wallets and fee rules.

pub mod fee_reader;
pub mod wallet_reader;
