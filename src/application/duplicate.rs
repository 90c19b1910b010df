use crate::config::DedupeConfig;
use crate::domain::event::WebhookEvent;
use crate::domain::ports::{LedgerStoreArc, WebhookLogStoreArc};
use crate::domain::wallet::Wallet;
use crate::error::{DuplicateKind, ReconError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use sha2::{Digest, Sha256};

const FIELD_SEPARATOR: [u8; 1] = [0x1f];

/// Fingerprint of an event's economic content.
///
/// Covers provider, amount, account, customer email and description, plus a
/// sub-hash of the payload identifiers (amount, account, customer id, session id).
/// The transaction reference is deliberately left out so a replay under a fresh
/// reference still collides.
pub fn content_hash(event: &WebhookEvent) -> String {
    let amount = event.amount.normalize().to_string();
    let identifiers = digest(&[
        &amount,
        &event.account_number,
        event.customer_id.as_deref().unwrap_or_default(),
        event.session_id.as_deref().unwrap_or_default(),
    ]);
    digest(&[
        event.provider.as_str(),
        &amount,
        &event.account_number,
        event.customer_email.as_deref().unwrap_or_default(),
        &event.description,
        &identifiers,
    ])
}

fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(FIELD_SEPARATOR);
    }
    hex::encode(hasher.finalize())
}

/// A positive duplicate verdict and the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub kind: DuplicateKind,
    /// Reference of the earlier delivery that this one collides with.
    pub existing_reference: String,
}

impl DuplicateMatch {
    fn new(kind: DuplicateKind, existing_reference: impl Into<String>) -> Self {
        Self {
            kind,
            existing_reference: existing_reference.into(),
        }
    }

    pub fn into_error(self) -> ReconError {
        ReconError::Duplicate {
            kind: self.kind,
            detail: format!("matches earlier delivery {}", self.existing_reference),
        }
    }
}

/// Ordered duplicate detection: reference, then content hash, then the
/// same-wallet same-amount time window. The first match wins.
pub struct DuplicateDetector {
    ledger: LedgerStoreArc,
    logs: WebhookLogStoreArc,
    config: DedupeConfig,
}

impl DuplicateDetector {
    pub fn new(ledger: LedgerStoreArc, logs: WebhookLogStoreArc, config: DedupeConfig) -> Self {
        Self {
            ledger,
            logs,
            config,
        }
    }

    /// Runs every enabled strategy against `event`.
    ///
    /// The heuristic needs the target wallet and only looks at credits; pass `None`
    /// when the wallet is not resolved yet.
    pub async fn check(
        &self,
        event: &WebhookEvent,
        content_hash: &str,
        wallet: Option<&Wallet>,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateMatch>> {
        if let Some(found) = self.by_reference(event).await? {
            return Ok(Some(found));
        }
        if let Some(found) = self.by_content_hash(content_hash, now).await? {
            return Ok(Some(found));
        }
        if let Some(wallet) = wallet
            && event.is_credit()
        {
            return self.by_time_window(event, wallet, now).await;
        }
        Ok(None)
    }

    async fn by_reference(&self, event: &WebhookEvent) -> Result<Option<DuplicateMatch>> {
        let mut candidates = vec![event.transaction_reference.as_str()];
        if let Some(provider_reference) = event.provider_reference.as_deref() {
            candidates.push(provider_reference);
        }

        for reference in candidates.into_iter().filter(|r| !r.is_empty()) {
            if let Some(existing) = self.ledger.find_by_reference(&event.provider, reference).await? {
                return Ok(Some(DuplicateMatch::new(
                    DuplicateKind::Reference,
                    existing.reference,
                )));
            }
        }
        Ok(None)
    }

    async fn by_content_hash(
        &self,
        content_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateMatch>> {
        let since = self
            .config
            .content_hash_window()
            .and_then(|window| TimeDelta::from_std(window).ok())
            .and_then(|window| now.checked_sub_signed(window));

        if let Some(log) = self.logs.find_applied_by_hash(content_hash, since).await? {
            return Ok(Some(DuplicateMatch::new(
                DuplicateKind::ContentHash,
                log.reference,
            )));
        }
        if let Some(existing) = self.ledger.find_by_content_hash(content_hash, since).await? {
            return Ok(Some(DuplicateMatch::new(
                DuplicateKind::ContentHash,
                existing.reference,
            )));
        }
        Ok(None)
    }

    async fn by_time_window(
        &self,
        event: &WebhookEvent,
        wallet: &Wallet,
        now: DateTime<Utc>,
    ) -> Result<Option<DuplicateMatch>> {
        if !self.config.heuristic_enabled {
            return Ok(None);
        }
        let window = TimeDelta::from_std(self.config.heuristic_window())
            .map_err(|e| ReconError::InternalError(Box::new(e)))?;

        let recent = self
            .ledger
            .recent_funding(
                wallet.id,
                event.amount,
                now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC),
            )
            .await?;
        Ok(recent.into_iter().next().map(|existing| {
            tracing::warn!(
                wallet_id = %wallet.id,
                amount = %event.amount,
                earlier = %existing.reference,
                incoming = %event.transaction_reference,
                "same-amount credit inside the heuristic window"
            );
            DuplicateMatch::new(DuplicateKind::Heuristic, existing.reference)
        }))
    }
}
