use super::event::Provider;
use super::fee::FeeConfiguration;
use super::money::Balance;
use super::transaction::{FundingRecord, LedgerTransaction};
use super::wallet::Wallet;
use super::webhook_log::WebhookLog;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Wallet lookup. Wallets are owned by an external service; this crate only reads
/// them and mutates balances through [`LedgerStore::commit_credit`].
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn store(&self, wallet: Wallet) -> Result<()>;
    async fn get(&self, wallet_id: Uuid) -> Result<Option<Wallet>>;
    async fn find_by_account_number(&self, account_number: &str) -> Result<Option<Wallet>>;
}

/// Everything needed to apply one credit as a single all-or-nothing unit.
#[derive(Debug, Clone)]
pub struct CreditCommit {
    pub wallet_id: Uuid,
    /// Wallet version the balance computation was based on.
    pub expected_version: u64,
    pub transaction: LedgerTransaction,
    pub funding_record: FundingRecord,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Finds a transaction from `provider` whose reference or provider reference
    /// equals `reference`.
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>>;

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>>;

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>>;

    /// Completed funding entries on `wallet_id` with exactly `amount` created at or after `since`.
    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>>;

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>>;

    /// Inserts the transaction and its funding record and moves the wallet balance to
    /// `transaction.balance_after`, atomically.
    ///
    /// Fails with `VersionConflict` if the wallet version moved since it was read, and
    /// with `Duplicate` if the provider already has a transaction under that reference.
    /// Nothing is written on failure.
    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet>;
}

#[async_trait]
pub trait WebhookLogStore: Send + Sync {
    /// Inserts the row, or on a `(reference, provider)` conflict merges status fields
    /// into the existing one. Returns the row as stored.
    async fn record(&self, log: WebhookLog) -> Result<WebhookLog>;

    async fn get(&self, reference: &str, provider: &Provider) -> Result<Option<WebhookLog>>;

    /// Any applied log carrying `content_hash`, received at or after `since` when given.
    async fn find_applied_by_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<WebhookLog>>;
}

/// Read access to fee rules. Administration of the rules lives elsewhere.
#[async_trait]
pub trait FeeConfigStore: Send + Sync {
    async fn store(&self, config: FeeConfiguration) -> Result<()>;
    async fn find_active(&self, fee_type: &str) -> Result<Option<FeeConfiguration>>;
}

/// Payload handed to the notification dispatcher after a balance change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub user_id: String,
    pub old_balance: Balance,
    pub new_balance: Balance,
    pub change: Decimal,
    pub reference: String,
    pub provider: Provider,
}

/// Fire-and-forget notification sink. Errors are logged by the caller and dropped.
#[async_trait]
pub trait BalanceNotifier: Send + Sync {
    async fn notify(&self, change: BalanceChange) -> Result<()>;
}

pub type WalletStoreArc = Arc<dyn WalletStore>;
pub type LedgerStoreArc = Arc<dyn LedgerStore>;
pub type WebhookLogStoreArc = Arc<dyn WebhookLogStore>;
pub type FeeConfigStoreArc = Arc<dyn FeeConfigStore>;
pub type BalanceNotifierArc = Arc<dyn BalanceNotifier>;
