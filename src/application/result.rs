use crate::application::ledger::BalanceValidation;
use crate::domain::transaction::LedgerTransaction;
use crate::domain::wallet::Wallet;
use crate::error::{ErrorKind, ReconError};
use serde::Serialize;

/// Outcome of one webhook delivery, returned to the provider.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub success: bool,
    pub message: String,
    /// The delivery reached a definitive business outcome and should not be retried.
    pub processed: bool,
    pub wallet_updated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<LedgerTransaction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<Wallet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub warning: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance_validation: Option<BalanceValidation>,
}

impl ReconciliationResult {
    pub fn credited(
        message: impl Into<String>,
        transaction: LedgerTransaction,
        wallet: Wallet,
        validation: BalanceValidation,
    ) -> Self {
        Self {
            success: true,
            message: message.into(),
            processed: true,
            wallet_updated: true,
            transaction: Some(transaction),
            wallet: Some(wallet),
            error: None,
            error_kind: None,
            warning: false,
            balance_validation: Some(validation),
        }
    }

    /// Money moved but the follow-up integrity check disagreed.
    pub fn anomaly(
        message: impl Into<String>,
        transaction: LedgerTransaction,
        wallet: Wallet,
        validation: BalanceValidation,
    ) -> Self {
        let message = message.into();
        Self {
            success: false,
            error: Some(message.clone()),
            message,
            processed: true,
            wallet_updated: true,
            transaction: Some(transaction),
            wallet: Some(wallet),
            error_kind: Some(ErrorKind::IntegrityAnomaly),
            warning: true,
            balance_validation: Some(validation),
        }
    }

    pub fn acknowledged(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            processed: true,
            wallet_updated: false,
            transaction: None,
            wallet: None,
            error: None,
            error_kind: None,
            warning: false,
            balance_validation: None,
        }
    }

    pub fn failed(message: impl Into<String>, error: &ReconError) -> Self {
        let kind = error.kind();
        let processed = match kind {
            ErrorKind::Duplicate | ErrorKind::Validation | ErrorKind::IntegrityAnomaly => true,
            ErrorKind::Transport | ErrorKind::Authenticity | ErrorKind::Infrastructure => false,
        };
        Self {
            success: false,
            message: message.into(),
            processed,
            wallet_updated: false,
            transaction: None,
            wallet: None,
            error: Some(error.to_string()),
            error_kind: Some(kind),
            warning: false,
            balance_validation: None,
        }
    }

    pub fn with_warning(mut self, warning: bool) -> Self {
        self.warning = self.warning || warning;
        self
    }
}
