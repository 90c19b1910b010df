use crate::domain::event::Provider;
use crate::domain::fee::FeeConfiguration;
use crate::domain::money::Balance;
use crate::domain::ports::{CreditCommit, FeeConfigStore, LedgerStore, WalletStore, WebhookLogStore};
use crate::domain::transaction::{FundingRecord, LedgerTransaction, TransactionStatus, TransactionType};
use crate::domain::wallet::Wallet;
use crate::domain::webhook_log::WebhookLog;
use crate::error::{DuplicateKind, ReconError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    wallets: HashMap<Uuid, Wallet>,
    transactions: Vec<LedgerTransaction>,
    funding_records: Vec<FundingRecord>,
    webhook_logs: HashMap<(String, Provider), WebhookLog>,
    fees: HashMap<String, FeeConfiguration>,
}

/// A thread-safe in-memory backend for every storage port.
///
/// All tables sit behind one `RwLock`, so a credit commit is atomic with respect to
/// every other reader and writer. Suitable for tests and single-process deployments
/// where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a stored balance without touching the ledger. Administrative
    /// correction hook; leaves the wallet out of step with its transactions.
    pub async fn overwrite_balance(&self, wallet_id: Uuid, balance: Balance) -> Result<()> {
        let mut tables = self.tables.write().await;
        let wallet = tables
            .wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| ReconError::Storage(format!("Wallet {} not found", wallet_id)))?;
        wallet.balance = balance;
        Ok(())
    }

    pub async fn transactions(&self) -> Vec<LedgerTransaction> {
        self.tables.read().await.transactions.clone()
    }

    pub async fn webhook_logs(&self) -> Vec<WebhookLog> {
        self.tables.read().await.webhook_logs.values().cloned().collect()
    }
}

#[async_trait]
impl WalletStore for InMemoryStore {
    async fn store(&self, wallet: Wallet) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.wallets.insert(wallet.id, wallet);
        Ok(())
    }

    async fn get(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables.wallets.get(&wallet_id).cloned())
    }

    async fn find_by_account_number(&self, account_number: &str) -> Result<Option<Wallet>> {
        let tables = self.tables.read().await;
        Ok(tables
            .wallets
            .values()
            .find(|w| w.account_number == account_number)
            .cloned())
    }
}

#[async_trait]
impl LedgerStore for InMemoryStore {
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .find(|tx| &tx.provider == provider && tx.matches_reference(reference))
            .cloned())
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .find(|tx| {
                tx.content_hash.as_deref() == Some(content_hash)
                    && since.is_none_or(|since| tx.created_at >= since)
            })
            .cloned())
    }

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|tx| tx.wallet_id == wallet_id && tx.status == TransactionStatus::Completed)
            .cloned()
            .collect())
    }

    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .filter(|tx| {
                tx.wallet_id == wallet_id
                    && tx.r#type == TransactionType::Funding
                    && tx.status == TransactionStatus::Completed
                    && tx.amount.value() == amount
                    && tx.created_at >= since
            })
            .cloned()
            .collect())
    }

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .funding_records
            .iter()
            .filter(|r| r.wallet_id == wallet_id)
            .cloned()
            .collect())
    }

    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet> {
        let mut tables = self.tables.write().await;

        let tx = &commit.transaction;
        let candidates = std::iter::once(tx.reference.as_str()).chain(tx.provider_reference.as_deref());
        for candidate in candidates {
            if tables
                .transactions
                .iter()
                .any(|existing| existing.provider == tx.provider && existing.matches_reference(candidate))
            {
                return Err(ReconError::Duplicate {
                    kind: DuplicateKind::Reference,
                    detail: format!("reference {} already recorded", candidate),
                });
            }
        }

        let wallet = tables
            .wallets
            .get(&commit.wallet_id)
            .ok_or_else(|| ReconError::Storage(format!("Wallet {} not found", commit.wallet_id)))?;
        if wallet.version != commit.expected_version {
            return Err(ReconError::VersionConflict(commit.wallet_id));
        }

        let mut updated = wallet.clone();
        updated.balance = tx.balance_after;
        updated.last_transaction_at = Some(tx.created_at);
        updated.version += 1;

        tables.wallets.insert(updated.id, updated.clone());
        tables.transactions.push(commit.transaction);
        tables.funding_records.push(commit.funding_record);
        Ok(updated)
    }
}

#[async_trait]
impl WebhookLogStore for InMemoryStore {
    async fn record(&self, log: WebhookLog) -> Result<WebhookLog> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .webhook_logs
            .entry(log.key())
            .and_modify(|existing| existing.merge_outcome(&log))
            .or_insert_with(|| log.clone());
        Ok(stored.clone())
    }

    async fn get(&self, reference: &str, provider: &Provider) -> Result<Option<WebhookLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .webhook_logs
            .get(&(reference.to_string(), provider.clone()))
            .cloned())
    }

    async fn find_applied_by_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<WebhookLog>> {
        let tables = self.tables.read().await;
        Ok(tables
            .webhook_logs
            .values()
            .find(|log| {
                log.applied()
                    && log.content_hash == content_hash
                    && since.is_none_or(|since| log.received_at >= since)
            })
            .cloned())
    }
}

#[async_trait]
impl FeeConfigStore for InMemoryStore {
    async fn store(&self, config: FeeConfiguration) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.fees.insert(config.fee_type.clone(), config);
        Ok(())
    }

    async fn find_active(&self, fee_type: &str) -> Result<Option<FeeConfiguration>> {
        let tables = self.tables.read().await;
        Ok(tables.fees.get(fee_type).filter(|c| c.is_active).cloned())
    }
}
