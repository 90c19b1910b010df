use crate::domain::event::Provider;
use crate::domain::fee::FeeConfiguration;
use crate::domain::ports::{CreditCommit, FeeConfigStore, LedgerStore, WalletStore, WebhookLogStore};
use crate::domain::transaction::{FundingRecord, LedgerTransaction, TransactionStatus, TransactionType};
use crate::domain::wallet::Wallet;
use crate::domain::webhook_log::WebhookLog;
use crate::error::{DuplicateKind, ReconError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const CF_WALLETS: &str = "wallets";
/// Keyed `<wallet_id>/<transaction_id>` so a wallet's history is one key range.
pub const CF_TRANSACTIONS: &str = "transactions";
/// `<provider>/<reference>` to transaction key, for both reference and provider reference.
pub const CF_REFERENCES: &str = "references";
pub const CF_FUNDING_RECORDS: &str = "funding_records";
pub const CF_WEBHOOK_LOGS: &str = "webhook_logs";
pub const CF_FEES: &str = "fees";

const COLUMN_FAMILIES: [&str; 6] = [
    CF_WALLETS,
    CF_TRANSACTIONS,
    CF_REFERENCES,
    CF_FUNDING_RECORDS,
    CF_WEBHOOK_LOGS,
    CF_FEES,
];

/// A persistent backend for every storage port, one column family per table.
///
/// A credit commit is a single `WriteBatch`; the version check and the batch write
/// run under a process-wide commit lock. `Clone` shares the underlying `Arc<DB>`.
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<DB>,
    commit_lock: Arc<Mutex<()>>,
}

impl RocksDbStore {
    /// Opens or creates a database at `path`, creating any missing column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect::<Vec<_>>();
        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            commit_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| ReconError::Storage(format!("{} column family not found", name)))
    }

    fn read<T: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        match self.db.get_pinned_cf(cf, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn write<T: Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db.put_cf(cf, key, serde_json::to_vec(value)?)?;
        Ok(())
    }

    /// Every value in `cf_name` whose key starts with `prefix`.
    fn scan<T: DeserializeOwned>(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(serde_json::from_slice(&value)?);
        }
        Ok(values)
    }

    fn reference_key(provider: &Provider, reference: &str) -> Vec<u8> {
        format!("{}/{}", provider, reference).into_bytes()
    }

    fn transaction_key(wallet_id: Uuid, transaction_id: Uuid) -> Vec<u8> {
        format!("{}/{}", wallet_id, transaction_id).into_bytes()
    }

    fn wallet_transactions(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        self.scan(CF_TRANSACTIONS, format!("{}/", wallet_id).as_bytes())
    }
}

#[async_trait]
impl WalletStore for RocksDbStore {
    async fn store(&self, wallet: Wallet) -> Result<()> {
        self.write(CF_WALLETS, wallet.id.as_bytes(), &wallet)
    }

    async fn get(&self, wallet_id: Uuid) -> Result<Option<Wallet>> {
        self.read(CF_WALLETS, wallet_id.as_bytes())
    }

    async fn find_by_account_number(&self, account_number: &str) -> Result<Option<Wallet>> {
        let wallets: Vec<Wallet> = self.scan(CF_WALLETS, &[])?;
        Ok(wallets
            .into_iter()
            .find(|w| w.account_number == account_number))
    }
}

#[async_trait]
impl LedgerStore for RocksDbStore {
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        let cf = self.cf(CF_REFERENCES)?;
        let Some(tx_key) = self.db.get_cf(cf, Self::reference_key(provider, reference))? else {
            return Ok(None);
        };
        self.read(CF_TRANSACTIONS, &tx_key)
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>> {
        let transactions: Vec<LedgerTransaction> = self.scan(CF_TRANSACTIONS, &[])?;
        Ok(transactions.into_iter().find(|tx| {
            tx.content_hash.as_deref() == Some(content_hash)
                && since.is_none_or(|since| tx.created_at >= since)
        }))
    }

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .wallet_transactions(wallet_id)?
            .into_iter()
            .filter(|tx| tx.status == TransactionStatus::Completed)
            .collect())
    }

    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        Ok(self
            .wallet_transactions(wallet_id)?
            .into_iter()
            .filter(|tx| {
                tx.r#type == TransactionType::Funding
                    && tx.status == TransactionStatus::Completed
                    && tx.amount.value() == amount
                    && tx.created_at >= since
            })
            .collect())
    }

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>> {
        self.scan(CF_FUNDING_RECORDS, format!("{}/", wallet_id).as_bytes())
    }

    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| ReconError::Storage("commit lock poisoned".to_string()))?;

        let tx = &commit.transaction;
        let mut references = vec![Self::reference_key(&tx.provider, &tx.reference)];
        if let Some(provider_reference) = tx.provider_reference.as_deref() {
            references.push(Self::reference_key(&tx.provider, provider_reference));
        }
        let cf_references = self.cf(CF_REFERENCES)?;
        for key in &references {
            if self.db.get_pinned_cf(cf_references, key)?.is_some() {
                return Err(ReconError::Duplicate {
                    kind: DuplicateKind::Reference,
                    detail: format!("reference {} already recorded", tx.reference),
                });
            }
        }

        let wallet: Wallet = self
            .read(CF_WALLETS, commit.wallet_id.as_bytes())?
            .ok_or_else(|| ReconError::Storage(format!("Wallet {} not found", commit.wallet_id)))?;
        if wallet.version != commit.expected_version {
            return Err(ReconError::VersionConflict(commit.wallet_id));
        }

        let mut updated = wallet;
        updated.balance = tx.balance_after;
        updated.last_transaction_at = Some(tx.created_at);
        updated.version += 1;

        let tx_key = Self::transaction_key(tx.wallet_id, tx.id);
        let record_key = Self::transaction_key(tx.wallet_id, commit.funding_record.id);

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_WALLETS)?, updated.id.as_bytes(), serde_json::to_vec(&updated)?);
        batch.put_cf(self.cf(CF_TRANSACTIONS)?, &tx_key, serde_json::to_vec(tx)?);
        batch.put_cf(
            self.cf(CF_FUNDING_RECORDS)?,
            record_key,
            serde_json::to_vec(&commit.funding_record)?,
        );
        for key in references {
            batch.put_cf(cf_references, key, &tx_key);
        }
        self.db.write(batch)?;

        Ok(updated)
    }
}

#[async_trait]
impl WebhookLogStore for RocksDbStore {
    async fn record(&self, log: WebhookLog) -> Result<WebhookLog> {
        let _guard = self
            .commit_lock
            .lock()
            .map_err(|_| ReconError::Storage("commit lock poisoned".to_string()))?;

        let key = Self::reference_key(&log.provider, &log.reference);
        let stored = match self.read::<WebhookLog>(CF_WEBHOOK_LOGS, &key)? {
            Some(mut existing) => {
                existing.merge_outcome(&log);
                existing
            }
            None => log,
        };
        self.write(CF_WEBHOOK_LOGS, &key, &stored)?;
        Ok(stored)
    }

    async fn get(&self, reference: &str, provider: &Provider) -> Result<Option<WebhookLog>> {
        self.read(CF_WEBHOOK_LOGS, &Self::reference_key(provider, reference))
    }

    async fn find_applied_by_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<WebhookLog>> {
        let logs: Vec<WebhookLog> = self.scan(CF_WEBHOOK_LOGS, &[])?;
        Ok(logs.into_iter().find(|log| {
            log.applied()
                && log.content_hash == content_hash
                && since.is_none_or(|since| log.received_at >= since)
        }))
    }
}

#[async_trait]
impl FeeConfigStore for RocksDbStore {
    async fn store(&self, config: FeeConfiguration) -> Result<()> {
        self.write(CF_FEES, config.fee_type.as_bytes(), &config)
    }

    async fn find_active(&self, fee_type: &str) -> Result<Option<FeeConfiguration>> {
        Ok(self
            .read::<FeeConfiguration>(CF_FEES, fee_type.as_bytes())?
            .filter(|c| c.is_active))
    }
}
