//! Domain model: wallets, ledger entries, canonical webhook events, idempotency
//! records, fee rules, and the ports the application layer depends on.

pub mod event;
pub mod fee;
pub mod money;
pub mod ports;
pub mod transaction;
pub mod wallet;
pub mod webhook_log;
