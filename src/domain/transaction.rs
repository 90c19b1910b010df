use super::event::Provider;
use super::money::{Amount, Balance};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Funding,
    Withdrawal,
    Transfer,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Completed,
    Failed,
    Pending,
}

/// An immutable ledger entry. Created once per applied settlement and never mutated.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    /// Gross amount as settled by the provider.
    pub amount: Amount,
    pub r#type: TransactionType,
    pub status: TransactionStatus,
    pub provider: Provider,
    /// Externally unique per provider.
    pub reference: String,
    pub provider_reference: Option<String>,
    pub fee: Decimal,
    pub balance_before: Balance,
    pub balance_after: Balance,
    pub content_hash: Option<String>,
    pub metadata: BTreeMap<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    pub fn net_amount(&self) -> Decimal {
        self.amount.value() - self.fee
    }

    /// Signed contribution of this entry to its wallet balance.
    ///
    /// Only completed entries count. Outgoing entries carry their fee on top of the amount.
    /// `None` when the figure does not fit in a `Decimal`.
    pub fn balance_effect(&self) -> Option<Decimal> {
        match (self.status, self.r#type) {
            (TransactionStatus::Completed, TransactionType::Funding) => {
                self.amount.value().checked_sub(self.fee)
            }
            (TransactionStatus::Completed, TransactionType::Withdrawal)
            | (TransactionStatus::Completed, TransactionType::Transfer) => {
                self.amount.value().checked_add(self.fee).map(|v| -v)
            }
            (TransactionStatus::Failed, _) | (TransactionStatus::Pending, _) => Some(Decimal::ZERO),
        }
    }

    pub fn matches_reference(&self, reference: &str) -> bool {
        self.reference == reference || self.provider_reference.as_deref() == Some(reference)
    }
}

/// Reporting copy of an applied funding, read by administration tooling.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FundingRecord {
    pub id: Uuid,
    pub transaction_id: Uuid,
    pub wallet_id: Uuid,
    pub owner_id: String,
    pub provider: Provider,
    pub reference: String,
    pub amount: Decimal,
    pub fee: Decimal,
    pub net_amount: Decimal,
    pub balance_before: Balance,
    pub balance_after: Balance,
    pub created_at: DateTime<Utc>,
}

impl FundingRecord {
    pub fn from_transaction(tx: &LedgerTransaction, owner_id: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id: tx.id,
            wallet_id: tx.wallet_id,
            owner_id: owner_id.to_string(),
            provider: tx.provider.clone(),
            reference: tx.reference.clone(),
            amount: tx.amount.value(),
            fee: tx.fee,
            net_amount: tx.net_amount(),
            balance_before: tx.balance_before,
            balance_after: tx.balance_after,
            created_at: tx.created_at,
        }
    }
}
