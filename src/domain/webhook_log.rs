use super::event::Provider;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogStatus {
    /// Credit applied to the wallet.
    Processed,
    /// Credit applied, but the post-update integrity check disagreed.
    Anomaly,
    /// Non-credit notification, recorded without touching the ledger.
    Ignored,
    Duplicate,
    Rejected,
    /// Infrastructure fault; nothing applied.
    Failed,
}

/// Idempotency record, unique per `(reference, provider)`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WebhookLog {
    pub provider: Provider,
    pub reference: String,
    pub content_hash: String,
    pub event_type: String,
    pub account_number: Option<String>,
    pub amount: Option<Decimal>,
    pub status: LogStatus,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub wallet_updated: bool,
    pub error: Option<String>,
    pub warning: Option<String>,
    pub delivery_count: u32,
}

impl WebhookLog {
    pub fn key(&self) -> (String, Provider) {
        (self.reference.clone(), self.provider.clone())
    }

    /// True when this delivery moved money, whether or not the follow-up check agreed.
    pub fn applied(&self) -> bool {
        self.wallet_updated
    }

    /// Folds the outcome of a later delivery into this row.
    ///
    /// Only status fields change. Payload and content hash stay as first recorded, and a
    /// row that already moved money keeps its applied status and flag.
    pub fn merge_outcome(&mut self, later: &WebhookLog) {
        self.delivery_count += 1;
        self.processed_at = later.processed_at;
        if self.wallet_updated {
            if later.status != LogStatus::Duplicate {
                self.warning = later.warning.clone().or(self.warning.take());
            }
            return;
        }
        self.status = later.status;
        self.wallet_updated = later.wallet_updated;
        self.error = later.error.clone();
        self.warning = later.warning.clone();
    }
}
