#![allow(dead_code)]

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::{Sha256, Sha512};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;
use webhook_ledger::application::engine::{ReconciliationEngine, StoreSet, WebhookRequest};
use webhook_ledger::config::{AppConfig, ProviderCredentials};
use webhook_ledger::domain::event::Provider;
use webhook_ledger::domain::fee::FeeConfiguration;
use webhook_ledger::domain::ports::{
    CreditCommit, FeeConfigStore, LedgerStore, WalletStore, WebhookLogStore,
};
use webhook_ledger::domain::transaction::{FundingRecord, LedgerTransaction};
use webhook_ledger::domain::wallet::Wallet;
use webhook_ledger::domain::webhook_log::WebhookLog;
use webhook_ledger::error::{ReconError, Result};
use webhook_ledger::infrastructure::in_memory::InMemoryStore;

pub const ACCOUNT: &str = "1234567890";
pub const PAYSTACK_SECRET: &str = "sk_test_paystack";
pub const MONNIFY_SECRET: &str = "mnfy_secret";
pub const SAFEHAVEN_SECRET: &str = "sh_secret";
pub const SAFEHAVEN_CLIENT_ID: &str = "client-42";
pub const ACME_SECRET: &str = "acme_secret";

fn credentials(secret: &str, client_id: Option<&str>) -> ProviderCredentials {
    ProviderCredentials {
        secret: Some(secret.to_string()),
        client_id: client_id.map(str::to_string),
    }
}

/// Production mode with secrets for every signing provider.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config
        .providers
        .insert("paystack".to_string(), credentials(PAYSTACK_SECRET, None));
    config
        .providers
        .insert("monnify".to_string(), credentials(MONNIFY_SECRET, None));
    config.providers.insert(
        "safehaven".to_string(),
        credentials(SAFEHAVEN_SECRET, Some(SAFEHAVEN_CLIENT_ID)),
    );
    config
        .providers
        .insert("acme-pay".to_string(), credentials(ACME_SECRET, None));
    config
}

pub struct Harness {
    pub engine: Arc<ReconciliationEngine>,
    pub store: Arc<InMemoryStore>,
    pub wallet: Wallet,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        Self::build(&config, store.clone(), StoreSet::shared(store)).await
    }

    /// Same as `with_config` but with the ledger port wrapped around the shared store.
    pub async fn with_ledger<F>(config: AppConfig, wrap: F) -> Self
    where
        F: FnOnce(Arc<InMemoryStore>) -> Arc<dyn LedgerStore>,
    {
        let store = Arc::new(InMemoryStore::new());
        let mut stores = StoreSet::shared(store.clone());
        stores.ledger = wrap(store.clone());
        Self::build(&config, store, stores).await
    }

    async fn build(config: &AppConfig, store: Arc<InMemoryStore>, stores: StoreSet) -> Self {
        let wallet = seed_wallet(&store, "user-1", ACCOUNT).await;
        let engine = Arc::new(ReconciliationEngine::new(config, stores));
        Self {
            engine,
            store,
            wallet,
        }
    }

    pub async fn balance(&self) -> Decimal {
        self.wallet_state().await.balance.value()
    }

    pub async fn wallet_state(&self) -> Wallet {
        WalletStore::get(self.store.as_ref(), self.wallet.id)
            .await
            .unwrap()
            .unwrap()
    }

    pub async fn set_fee(&self, rule: FeeConfiguration) {
        FeeConfigStore::store(self.store.as_ref(), rule).await.unwrap();
    }

    pub async fn log(&self, reference: &str, provider: &Provider) -> Option<WebhookLog> {
        WebhookLogStore::get(self.store.as_ref(), reference, provider)
            .await
            .unwrap()
    }
}

pub async fn seed_wallet(store: &InMemoryStore, owner: &str, account: &str) -> Wallet {
    let wallet = Wallet::new(owner, account);
    WalletStore::store(store, wallet.clone()).await.unwrap();
    wallet
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

pub fn hmac_sha512_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha512>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn safehaven_signature() -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(SAFEHAVEN_SECRET.as_bytes()).unwrap();
    mac.update(SAFEHAVEN_CLIENT_ID.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// A Paystack `charge.success`; `kobo` is the amount in minor units.
pub fn paystack_payload(reference: &str, kobo: i64, account: &str) -> Value {
    json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": kobo,
            "currency": "NGN",
            "status": "success",
            "channel": "dedicated_nuban",
            "customer": { "email": "ada@example.com", "customer_code": "CUS_1" },
            "authorization": {
                "receiver_bank_account_number": account,
                "narration": "Transfer from Ada",
                "sender_bank": "Test Bank"
            }
        }
    })
}

pub fn paystack_request(payload: &Value) -> WebhookRequest {
    let body = serde_json::to_vec(payload).unwrap();
    WebhookRequest {
        provider: Provider::Paystack,
        signature: Some(hmac_sha512_hex(PAYSTACK_SECRET, &body)),
        body,
    }
}

pub fn paystack_credit(reference: &str, kobo: i64) -> WebhookRequest {
    paystack_request(&paystack_payload(reference, kobo, ACCOUNT))
}

pub fn monnify_payload(reference: &str, amount: &str, account: &str) -> Value {
    json!({
        "eventType": "SUCCESSFUL_TRANSACTION",
        "eventData": {
            "transactionReference": reference,
            "paymentReference": format!("MNFY-{}", reference),
            "amountPaid": amount,
            "currency": "NGN",
            "paymentStatus": "PAID",
            "paymentDescription": "Wallet top-up",
            "customer": { "email": "ada@example.com", "name": "Ada" },
            "destinationAccountInformation": { "accountNumber": account, "bankName": "Wema" }
        }
    })
}

pub fn monnify_request(payload: &Value) -> WebhookRequest {
    let body = serde_json::to_vec(payload).unwrap();
    WebhookRequest {
        provider: Provider::Monnify,
        signature: Some(hmac_sha512_hex(MONNIFY_SECRET, &body)),
        body,
    }
}

pub fn safehaven_payload(reference: &str, amount: f64, account: &str) -> Value {
    json!({
        "type": "virtualAccount.transfer",
        "data": {
            "paymentReference": reference,
            "amount": amount,
            "creditAccountNumber": account,
            "status": "Completed",
            "narration": "Safehaven deposit",
            "sessionId": format!("S-{}", reference)
        }
    })
}

pub fn safehaven_request(payload: &Value) -> WebhookRequest {
    WebhookRequest {
        provider: Provider::Safehaven,
        body: serde_json::to_vec(payload).unwrap(),
        signature: Some(safehaven_signature()),
    }
}

pub fn bloc_payload(event: &str, reference: &str, kobo: i64, account: &str) -> Value {
    json!({
        "event": event,
        "data": {
            "reference": reference,
            "amount": kobo,
            "status": "successful",
            "meta_data": { "account_number": account }
        }
    })
}

pub fn bloc_request(payload: &Value) -> WebhookRequest {
    WebhookRequest {
        provider: Provider::Bloc,
        body: serde_json::to_vec(payload).unwrap(),
        signature: None,
    }
}

pub fn acme_payload(reference: &str, amount: &str, account: &str) -> Value {
    json!({
        "event": "credit",
        "reference": reference,
        "amount": amount,
        "accountNumber": account,
        "status": "success"
    })
}

pub fn acme_request(payload: &Value) -> WebhookRequest {
    let body = serde_json::to_vec(payload).unwrap();
    WebhookRequest {
        provider: Provider::Other("acme-pay".to_string()),
        signature: Some(hmac_sha256_hex(ACME_SECRET, &body)),
        body,
    }
}

// ---------------------------------------------------------------------------
// Ledger wrappers
// ---------------------------------------------------------------------------

/// Delegates to an inner store, failing `commit_credit` while `fail_commits` is set.
pub struct FlakyLedger {
    pub inner: Arc<InMemoryStore>,
    pub fail_commits: AtomicBool,
}

/// Reports a version conflict for the first `conflicts` commits, as if another
/// writer had moved the wallet each time.
pub struct ConflictingLedger {
    pub inner: Arc<InMemoryStore>,
    pub conflicts: AtomicU32,
    pub attempts: AtomicU32,
}

impl ConflictingLedger {
    pub fn new(inner: Arc<InMemoryStore>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts: AtomicU32::new(conflicts),
            attempts: AtomicU32::new(0),
        }
    }
}

/// Hides every committed transaction from integrity reads, so the check after a
/// commit always disagrees with the stored balance.
pub struct SkewedLedger {
    pub inner: Arc<InMemoryStore>,
    pub hidden: Mutex<HashSet<Uuid>>,
}

#[async_trait]
impl LedgerStore for FlakyLedger {
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_reference(provider, reference).await
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_content_hash(content_hash, since).await
    }

    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        self.inner.recent_funding(wallet_id, amount, since).await
    }

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>> {
        self.inner.funding_records(wallet_id).await
    }

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        self.inner.completed_for_wallet(wallet_id).await
    }

    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(ReconError::Storage("connection reset during commit".to_string()));
        }
        self.inner.commit_credit(commit).await
    }
}

#[async_trait]
impl LedgerStore for SkewedLedger {
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_reference(provider, reference).await
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_content_hash(content_hash, since).await
    }

    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        self.inner.recent_funding(wallet_id, amount, since).await
    }

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>> {
        self.inner.funding_records(wallet_id).await
    }

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        let hidden = self.hidden.lock().unwrap().clone();
        Ok(self
            .inner
            .completed_for_wallet(wallet_id)
            .await?
            .into_iter()
            .filter(|tx| !hidden.contains(&tx.id))
            .collect())
    }

    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet> {
        let id = commit.transaction.id;
        let wallet = self.inner.commit_credit(commit).await?;
        self.hidden.lock().unwrap().insert(id);
        Ok(wallet)
    }
}

#[async_trait]
impl LedgerStore for ConflictingLedger {
    async fn find_by_reference(
        &self,
        provider: &Provider,
        reference: &str,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_reference(provider, reference).await
    }

    async fn find_by_content_hash(
        &self,
        content_hash: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Option<LedgerTransaction>> {
        self.inner.find_by_content_hash(content_hash, since).await
    }

    async fn recent_funding(
        &self,
        wallet_id: Uuid,
        amount: Decimal,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerTransaction>> {
        self.inner.recent_funding(wallet_id, amount, since).await
    }

    async fn funding_records(&self, wallet_id: Uuid) -> Result<Vec<FundingRecord>> {
        self.inner.funding_records(wallet_id).await
    }

    async fn completed_for_wallet(&self, wallet_id: Uuid) -> Result<Vec<LedgerTransaction>> {
        self.inner.completed_for_wallet(wallet_id).await
    }

    async fn commit_credit(&self, commit: CreditCommit) -> Result<Wallet> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if remaining.is_ok() {
            return Err(ReconError::VersionConflict(commit.wallet_id));
        }
        self.inner.commit_credit(commit).await
    }
}
