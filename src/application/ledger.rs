use crate::application::duplicate::DuplicateDetector;
use crate::domain::event::WebhookEvent;
use crate::domain::money::{Amount, Balance};
use crate::domain::ports::{CreditCommit, LedgerStoreArc, WalletStoreArc};
use crate::domain::transaction::{
    FundingRecord, LedgerTransaction, TransactionStatus, TransactionType,
};
use crate::domain::wallet::Wallet;
use crate::error::{ReconError, Result};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Stored balance against the balance recomputed from completed transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceCheck {
    pub stored: Decimal,
    pub computed: Decimal,
    /// `stored - computed`.
    pub discrepancy: Decimal,
    pub transaction_count: usize,
    pub is_valid: bool,
}

impl BalanceCheck {
    fn compare(stored: Balance, transactions: &[LedgerTransaction]) -> Result<Self> {
        let computed = transactions
            .iter()
            .try_fold(Decimal::ZERO, |sum, tx| {
                tx.balance_effect().and_then(|effect| sum.checked_add(effect))
            })
            .ok_or_else(|| {
                ReconError::Validation(format!(
                    "transaction history of {} entries overflows the balance range",
                    transactions.len()
                ))
            })?;
        let discrepancy = stored.value().checked_sub(computed).ok_or_else(|| {
            ReconError::Validation(format!(
                "stored balance {} is out of range of computed {}",
                stored, computed
            ))
        })?;
        Ok(Self {
            stored: stored.value(),
            computed,
            discrepancy,
            transaction_count: transactions.len(),
            is_valid: discrepancy.is_zero(),
        })
    }

    /// The recomputation itself failed; treated as not valid.
    fn unavailable(stored: Balance) -> Self {
        Self {
            stored: stored.value(),
            computed: Decimal::ZERO,
            discrepancy: Decimal::ZERO,
            transaction_count: 0,
            is_valid: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceValidation {
    pub before: BalanceCheck,
    pub after: BalanceCheck,
}

/// A committed credit and the integrity checks around it.
#[derive(Debug, Clone)]
pub struct AppliedCredit {
    pub transaction: LedgerTransaction,
    pub wallet: Wallet,
    pub previous_balance: Balance,
    pub validation: BalanceValidation,
}

impl AppliedCredit {
    pub fn is_consistent(&self) -> bool {
        self.validation.after.is_valid
    }
}

/// Applies credits to wallets.
///
/// Credits to the same wallet are serialised through a per-wallet lock, and the
/// commit itself is a compare-and-swap on the wallet version, so a writer outside
/// this process still cannot cause a lost update.
pub struct LedgerUpdater {
    wallets: WalletStoreArc,
    ledger: LedgerStoreArc,
    detector: Arc<DuplicateDetector>,
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    max_attempts: u32,
}

impl LedgerUpdater {
    pub fn new(
        wallets: WalletStoreArc,
        ledger: LedgerStoreArc,
        detector: Arc<DuplicateDetector>,
        max_attempts: u32,
    ) -> Self {
        Self {
            wallets,
            ledger,
            detector,
            locks: DashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock_for(&self, wallet_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(wallet_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Recomputes the balance of `wallet` from its completed transactions.
    pub async fn verify_integrity(&self, wallet: &Wallet) -> Result<BalanceCheck> {
        let transactions = self.ledger.completed_for_wallet(wallet.id).await?;
        BalanceCheck::compare(wallet.balance, &transactions)
    }

    /// Credits `event.amount - fee` to the wallet.
    ///
    /// Under the wallet lock: reloads the wallet, repeats duplicate detection,
    /// refuses to proceed on a pre-existing integrity mismatch, then commits the
    /// transaction, its funding record and the new balance as one unit. A version
    /// conflict is retried up to the configured number of attempts.
    ///
    /// A failed post-commit check is reported through [`AppliedCredit::is_consistent`]
    /// rather than as an error, since the credit is already durable.
    pub async fn apply_credit(
        &self,
        wallet_id: Uuid,
        event: &WebhookEvent,
        fee: Decimal,
        content_hash: &str,
    ) -> Result<AppliedCredit> {
        let gross = Amount::new(event.amount)?;
        if fee < Decimal::ZERO {
            return Err(ReconError::Validation(format!("Negative fee {}", fee)));
        }
        let net = Amount::new(gross.value() - fee).map_err(|_| {
            ReconError::Validation(format!("fee {} exceeds amount {}", fee, gross))
        })?;

        let lock = self.lock_for(wallet_id);
        let _guard = lock.lock().await;

        let mut attempt = 0;
        let (updated, previous, transaction, before) = loop {
            attempt += 1;
            let now = Utc::now();

            let wallet = self.wallets.get(wallet_id).await?.ok_or_else(|| {
                ReconError::Validation(format!("Wallet {} not found", wallet_id))
            })?;
            if !wallet.is_active {
                return Err(ReconError::Validation(format!(
                    "Wallet {} is inactive",
                    wallet.account_number
                )));
            }
            if !wallet.currency.eq_ignore_ascii_case(&event.currency) {
                return Err(ReconError::Validation(format!(
                    "Currency {} does not match wallet currency {}",
                    event.currency, wallet.currency
                )));
            }

            if let Some(found) = self
                .detector
                .check(event, content_hash, Some(&wallet), now)
                .await?
            {
                return Err(found.into_error());
            }

            let before = self.verify_integrity(&wallet).await?;
            if !before.is_valid {
                tracing::error!(
                    wallet_id = %wallet.id,
                    stored = %before.stored,
                    computed = %before.computed,
                    discrepancy = %before.discrepancy,
                    "balance integrity mismatch before credit"
                );
                return Err(ReconError::IntegrityMismatch {
                    wallet_id: wallet.id,
                    stored: before.stored,
                    computed: before.computed,
                    discrepancy: before.discrepancy,
                });
            }

            let transaction = build_transaction(&wallet, event, gross, fee, net, content_hash, now)?;
            let funding_record = FundingRecord::from_transaction(&transaction, &wallet.owner_id);
            let commit = CreditCommit {
                wallet_id: wallet.id,
                expected_version: wallet.version,
                transaction: transaction.clone(),
                funding_record,
            };

            match self.ledger.commit_credit(commit).await {
                Ok(updated) => break (updated, wallet.balance, transaction, before),
                Err(ReconError::VersionConflict(id)) if attempt < self.max_attempts => {
                    tracing::warn!(wallet_id = %id, attempt, "wallet version moved, retrying credit");
                }
                Err(e) => return Err(e),
            }
        };

        let after = match self.verify_integrity(&updated).await {
            Ok(check) => check,
            Err(e) => {
                tracing::error!(wallet_id = %updated.id, error = %e, "post-credit integrity check failed to run");
                BalanceCheck::unavailable(updated.balance)
            }
        };
        if !after.is_valid {
            tracing::error!(
                wallet_id = %updated.id,
                reference = %transaction.reference,
                stored = %after.stored,
                computed = %after.computed,
                discrepancy = %after.discrepancy,
                "balance integrity mismatch after credit; manual reconciliation required"
            );
        }

        Ok(AppliedCredit {
            transaction,
            wallet: updated,
            previous_balance: previous,
            validation: BalanceValidation { before, after },
        })
    }
}

fn build_transaction(
    wallet: &Wallet,
    event: &WebhookEvent,
    gross: Amount,
    fee: Decimal,
    net: Amount,
    content_hash: &str,
    now: chrono::DateTime<Utc>,
) -> Result<LedgerTransaction> {
    let balance_after = wallet.balance.checked_add(net.into()).ok_or_else(|| {
        ReconError::Validation(format!(
            "crediting {} to wallet {} overflows its balance {}",
            net, wallet.account_number, wallet.balance
        ))
    })?;

    let mut metadata = event.metadata.clone();
    metadata.insert(
        "webhook".to_string(),
        json!({
            "eventType": event.event_type.to_string(),
            "sessionId": event.session_id,
            "customerEmail": event.customer_email,
            "customerId": event.customer_id,
            "accountName": event.account_name,
            "bankName": event.bank_name,
            "bankCode": event.bank_code,
            "providerTimestamp": event.timestamp.to_rfc3339(),
        }),
    );
    metadata.insert("description".to_string(), Value::String(event.description.clone()));

    Ok(LedgerTransaction {
        id: Uuid::new_v4(),
        wallet_id: wallet.id,
        amount: gross,
        r#type: TransactionType::Funding,
        status: TransactionStatus::Completed,
        provider: event.provider.clone(),
        reference: event.transaction_reference.clone(),
        provider_reference: event.provider_reference.clone(),
        fee,
        balance_before: wallet.balance,
        balance_after,
        content_hash: Some(content_hash.to_string()),
        metadata,
        created_at: now,
    })
}
