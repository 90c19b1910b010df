use crate::application::duplicate::{DuplicateDetector, content_hash};
use crate::application::fee_calculator::{FeeCalculator, FeeQuote};
use crate::application::ledger::{AppliedCredit, LedgerUpdater};
use crate::application::normalizer::DecoderRegistry;
use crate::application::result::ReconciliationResult;
use crate::application::signature::SignatureVerifier;
use crate::config::AppConfig;
use crate::domain::event::{Provider, ProviderPayload, WebhookEvent};
use crate::domain::money::Amount;
use crate::domain::ports::{
    BalanceChange, BalanceNotifierArc, FeeConfigStore, FeeConfigStoreArc, LedgerStore,
    LedgerStoreArc, WalletStore, WalletStoreArc, WebhookLogStore, WebhookLogStoreArc,
};
use crate::domain::webhook_log::{LogStatus, WebhookLog};
use crate::error::{ErrorKind, ReconError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// One inbound delivery as received by the HTTP layer.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub provider: Provider,
    pub body: Vec<u8>,
    pub signature: Option<String>,
}

/// Processing stages a delivery moves through. `Rejected` is reachable from every gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Verified,
    Normalized,
    DedupeChecked,
    FeeCalculated,
    PreValidated,
    Applied,
    PostValidated,
    Done,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "RECEIVED",
            Stage::Verified => "VERIFIED",
            Stage::Normalized => "NORMALIZED",
            Stage::DedupeChecked => "DEDUPE_CHECKED",
            Stage::FeeCalculated => "FEE_CALCULATED",
            Stage::PreValidated => "PRE_VALIDATED",
            Stage::Applied => "APPLIED",
            Stage::PostValidated => "POST_VALIDATED",
            Stage::Done => "DONE",
            Stage::Rejected => "REJECTED",
        };
        f.write_str(name)
    }
}

/// The four storage ports the engine needs.
#[derive(Clone)]
pub struct StoreSet {
    pub wallets: WalletStoreArc,
    pub ledger: LedgerStoreArc,
    pub logs: WebhookLogStoreArc,
    pub fees: FeeConfigStoreArc,
}

impl StoreSet {
    /// Uses one backend for every port.
    pub fn shared<S>(store: Arc<S>) -> Self
    where
        S: WalletStore + LedgerStore + WebhookLogStore + FeeConfigStore + 'static,
    {
        Self {
            wallets: store.clone(),
            ledger: store.clone(),
            logs: store.clone(),
            fees: store,
        }
    }
}

enum Settlement {
    Credited(AppliedCredit, FeeQuote),
    Acknowledged,
}

/// Drives a webhook from raw bytes to a committed credit (or a rejection).
///
/// Every delivery that gets past payload parsing leaves exactly one webhook log row
/// behind, whatever the outcome.
pub struct ReconciliationEngine {
    verifier: SignatureVerifier,
    registry: DecoderRegistry,
    detector: Arc<DuplicateDetector>,
    fees: FeeCalculator,
    ledger: LedgerUpdater,
    wallets: WalletStoreArc,
    logs: WebhookLogStoreArc,
    notifier: Option<BalanceNotifierArc>,
}

impl ReconciliationEngine {
    pub fn new(config: &AppConfig, stores: StoreSet) -> Self {
        let detector = Arc::new(DuplicateDetector::new(
            stores.ledger.clone(),
            stores.logs.clone(),
            config.dedupe.clone(),
        ));
        let ledger = LedgerUpdater::new(
            stores.wallets.clone(),
            stores.ledger,
            detector.clone(),
            config.ledger.max_commit_attempts,
        );
        Self {
            verifier: SignatureVerifier::from_config(config),
            registry: DecoderRegistry::default(),
            detector,
            fees: FeeCalculator::new(stores.fees),
            ledger,
            wallets: stores.wallets,
            logs: stores.logs,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: BalanceNotifierArc) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_fee_calculator(mut self, fees: FeeCalculator) -> Self {
        self.fees = fees;
        self
    }

    pub fn with_decoders(mut self, registry: DecoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[tracing::instrument(skip_all, fields(provider = %request.provider))]
    pub async fn process(&self, request: WebhookRequest) -> ReconciliationResult {
        let received_at = Utc::now();
        tracing::debug!(stage = %Stage::Received, bytes = request.body.len());

        let payload: Value = match serde_json::from_slice(&request.body) {
            Ok(payload) => payload,
            Err(e) => {
                let err = ReconError::Transport(e.to_string());
                tracing::warn!(stage = %Stage::Rejected, error = %err, "unreadable webhook body");
                return ReconciliationResult::failed("Webhook body is not valid JSON", &err);
            }
        };
        let input = ProviderPayload {
            provider: request.provider.clone(),
            payload,
        };

        let verification = self.verifier.verify(
            &input.provider,
            &request.body,
            &input.payload,
            request.signature.as_deref(),
        );
        if !verification.valid {
            let err = ReconError::Authenticity(verification.reason);
            tracing::warn!(stage = %Stage::Rejected, error = %err, "webhook failed verification");
            let log = self.unverified_log(&input, &request.body, received_at, &err);
            self.record(log).await;
            return ReconciliationResult::failed("Webhook signature could not be verified", &err);
        }
        tracing::debug!(stage = %Stage::Verified, reason = %verification.reason);

        let event = match self.registry.normalize(&input, received_at) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(stage = %Stage::Rejected, error = %err, "webhook could not be normalized");
                return ReconciliationResult::failed("Webhook payload could not be read", &err);
            }
        };
        let hash = content_hash(&event);
        tracing::debug!(
            stage = %Stage::Normalized,
            reference = %event.transaction_reference,
            event_type = %event.event_type,
            amount = %event.amount
        );

        let outcome = self.settle(&event, &hash, received_at).await;
        let (result, log) = self.conclude(&event, &hash, received_at, outcome);
        self.record(log).await;

        let result = if verification.warning {
            let mut result = result.with_warning(true);
            result.message = format!("{} ({})", result.message, verification.reason);
            result
        } else {
            result
        };
        tracing::info!(
            reference = %event.transaction_reference,
            success = result.success,
            wallet_updated = result.wallet_updated,
            error_kind = ?result.error_kind,
            "webhook reconciled"
        );
        result
    }

    async fn settle(
        &self,
        event: &WebhookEvent,
        hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        if !event.is_credit() {
            if let Some(found) = self.detector.check(event, hash, None, now).await? {
                return Err(found.into_error());
            }
            tracing::debug!(stage = %Stage::DedupeChecked);
            return Ok(Settlement::Acknowledged);
        }

        let wallet = self
            .wallets
            .find_by_account_number(&event.account_number)
            .await?
            .ok_or_else(|| {
                ReconError::Validation(format!(
                    "No wallet for account number {}",
                    event.account_number
                ))
            })?;
        if !wallet.is_active {
            return Err(ReconError::Validation(format!(
                "Wallet for account number {} is inactive",
                wallet.account_number
            )));
        }

        if let Some(found) = self.detector.check(event, hash, Some(&wallet), now).await? {
            return Err(found.into_error());
        }
        tracing::debug!(stage = %Stage::DedupeChecked, wallet_id = %wallet.id);

        let gross = Amount::new(event.amount)?;
        let quote = self.fees.calculate(&event.provider, gross).await?;
        tracing::debug!(stage = %Stage::FeeCalculated, fee = %quote.fee, source = ?quote.source);

        let applied = self.ledger.apply_credit(wallet.id, event, quote.fee, hash).await?;
        tracing::debug!(
            stage = %Stage::PreValidated,
            transactions = applied.validation.before.transaction_count
        );
        tracing::debug!(stage = %Stage::Applied, transaction_id = %applied.transaction.id);
        tracing::debug!(stage = %Stage::PostValidated, consistent = applied.is_consistent());

        Ok(Settlement::Credited(applied, quote))
    }

    fn conclude(
        &self,
        event: &WebhookEvent,
        hash: &str,
        received_at: DateTime<Utc>,
        outcome: Result<Settlement>,
    ) -> (ReconciliationResult, WebhookLog) {
        let mut log = event_log(event, hash, received_at);

        match outcome {
            Ok(Settlement::Credited(applied, quote)) => {
                self.notify(&applied);
                log.wallet_updated = true;
                let net = applied.transaction.net_amount();
                if applied.is_consistent() {
                    tracing::debug!(stage = %Stage::Done);
                    log.status = LogStatus::Processed;
                    let message = format!(
                        "Wallet credited with {} (gross {}, fee {})",
                        net, applied.transaction.amount, quote.fee
                    );
                    let result = ReconciliationResult::credited(
                        message,
                        applied.transaction,
                        applied.wallet,
                        applied.validation,
                    );
                    (result, log)
                } else {
                    let after = &applied.validation.after;
                    let message = format!(
                        "Wallet credited with {} but the balance no longer matches the ledger \
                         (stored {}, computed {}, discrepancy {}); manual reconciliation required",
                        net, after.stored, after.computed, after.discrepancy
                    );
                    log.status = LogStatus::Anomaly;
                    log.warning = Some(message.clone());
                    let result = ReconciliationResult::anomaly(
                        message,
                        applied.transaction,
                        applied.wallet,
                        applied.validation,
                    );
                    (result, log)
                }
            }
            Ok(Settlement::Acknowledged) => {
                tracing::debug!(stage = %Stage::Done);
                log.status = LogStatus::Ignored;
                let result = ReconciliationResult::acknowledged(format!(
                    "{} event acknowledged; no balance change",
                    event.event_type
                ));
                (result, log)
            }
            Err(err) => {
                tracing::debug!(stage = %Stage::Rejected, error = %err);
                log.error = Some(err.to_string());
                let message = match err.kind() {
                    ErrorKind::Duplicate => {
                        log.status = LogStatus::Duplicate;
                        "Webhook already processed; no further delivery required".to_string()
                    }
                    ErrorKind::Validation => {
                        log.status = LogStatus::Rejected;
                        format!("Webhook rejected: {}", err)
                    }
                    ErrorKind::Transport | ErrorKind::Authenticity => {
                        log.status = LogStatus::Rejected;
                        "Webhook could not be accepted".to_string()
                    }
                    ErrorKind::Infrastructure | ErrorKind::IntegrityAnomaly => {
                        tracing::error!(error = %err, "webhook processing failed");
                        log.status = LogStatus::Failed;
                        "Webhook processing failed; no changes were applied".to_string()
                    }
                };
                (ReconciliationResult::failed(message, &err), log)
            }
        }
    }

    fn notify(&self, applied: &AppliedCredit) {
        let Some(notifier) = self.notifier.clone() else {
            return;
        };
        let change = BalanceChange {
            user_id: applied.wallet.owner_id.clone(),
            old_balance: applied.previous_balance,
            new_balance: applied.wallet.balance,
            change: applied.transaction.net_amount(),
            reference: applied.transaction.reference.clone(),
            provider: applied.transaction.provider.clone(),
        };
        tokio::spawn(async move {
            let reference = change.reference.clone();
            if let Err(e) = notifier.notify(change).await {
                tracing::warn!(%reference, error = %e, "balance notification failed");
            }
        });
    }

    /// Log row for a delivery that failed verification.
    ///
    /// Keyed and hashed by a digest of the raw body, never by decoded fields. Decoded
    /// fields are kept for audit when the payload can be read.
    fn unverified_log(
        &self,
        input: &ProviderPayload,
        body: &[u8],
        received_at: DateTime<Utc>,
        err: &ReconError,
    ) -> WebhookLog {
        let digest = hex::encode(Sha256::digest(body));
        let decoded = self.registry.normalize(input, received_at).ok();
        WebhookLog {
            provider: input.provider.clone(),
            reference: format!("unverified:{}", &digest[..16]),
            content_hash: digest,
            event_type: decoded
                .as_ref()
                .map_or_else(|| "UNKNOWN".to_string(), |e| e.event_type.to_string()),
            account_number: decoded
                .as_ref()
                .map(|e| e.account_number.clone())
                .filter(|a| !a.is_empty()),
            amount: decoded.as_ref().map(|e| e.amount),
            status: LogStatus::Rejected,
            payload: input.payload.clone(),
            received_at,
            processed_at: None,
            wallet_updated: false,
            error: Some(err.to_string()),
            warning: None,
            delivery_count: 1,
        }
    }

    async fn record(&self, log: WebhookLog) {
        let reference = log.reference.clone();
        if let Err(e) = self.logs.record(log).await {
            tracing::error!(%reference, error = %e, "failed to write webhook log");
        }
    }
}

fn event_log(event: &WebhookEvent, hash: &str, received_at: DateTime<Utc>) -> WebhookLog {
    let reference = if !event.transaction_reference.is_empty() {
        event.transaction_reference.clone()
    } else if let Some(provider_reference) = event.provider_reference.clone() {
        provider_reference
    } else {
        format!("hash:{}", &hash[..16])
    };
    WebhookLog {
        provider: event.provider.clone(),
        reference,
        content_hash: hash.to_string(),
        event_type: event.event_type.to_string(),
        account_number: Some(event.account_number.clone()).filter(|a| !a.is_empty()),
        amount: Some(event.amount),
        status: LogStatus::Rejected,
        payload: event.raw_payload.clone(),
        received_at,
        processed_at: Some(Utc::now()),
        wallet_updated: false,
        error: None,
        warning: None,
        delivery_count: 1,
    }
}
