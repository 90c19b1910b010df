use super::money::Balance;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user wallet fed by external settlement events.
///
/// The stored `balance` is expected to equal the sum of the wallet's completed
/// transactions. The wallet does not maintain that invariant itself; the ledger
/// updater checks it before and after every credit.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: Uuid,
    pub owner_id: String,
    /// The virtual account number providers settle into.
    pub account_number: String,
    pub balance: Balance,
    pub currency: String,
    pub is_active: bool,
    pub last_transaction_at: Option<DateTime<Utc>>,
    /// Bumped on every balance mutation; used for compare-and-swap commits.
    pub version: u64,
}

impl Wallet {
    pub fn new(owner_id: impl Into<String>, account_number: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            account_number: account_number.into(),
            balance: Balance::ZERO,
            currency: "NGN".to_string(),
            is_active: true,
            last_transaction_at: None,
            version: 0,
        }
    }
}
