use rust_decimal::Decimal;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Coarse classification of every failure the pipeline can produce.
///
/// The orchestrator matches on this exhaustively to build the webhook result,
/// and the HTTP layer maps it to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed payload or unsupported provider.
    Transport,
    /// Signature mismatch or missing signing configuration in production.
    Authenticity,
    /// Idempotency hit.
    Duplicate,
    /// Bad amount, fee at or above gross, unknown wallet, pre-update integrity mismatch.
    Validation,
    /// Post-update integrity check failed after the credit was committed.
    IntegrityAnomaly,
    /// Storage fault; nothing was applied.
    Infrastructure,
}

/// Which duplicate-detection strategy matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateKind {
    Reference,
    ContentHash,
    Heuristic,
}

impl fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateKind::Reference => f.write_str("reference match"),
            DuplicateKind::ContentHash => f.write_str("content-hash match"),
            DuplicateKind::Heuristic => f.write_str("suspected duplicate"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("Malformed webhook payload: {0}")]
    Transport(String),
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),
    #[error("Signature verification failed: {0}")]
    Authenticity(String),
    #[error("Duplicate webhook ({kind}): {detail}")]
    Duplicate { kind: DuplicateKind, detail: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(
        "Balance integrity mismatch on wallet {wallet_id}: stored {stored}, computed {computed}, discrepancy {discrepancy}"
    )]
    IntegrityMismatch {
        wallet_id: Uuid,
        stored: Decimal,
        computed: Decimal,
        discrepancy: Decimal,
    },
    #[error("Concurrent balance update on wallet {0}")]
    VersionConflict(Uuid),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    ConfigError(#[from] serde_yaml::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl ReconError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReconError::Transport(_) | ReconError::UnsupportedProvider(_) => ErrorKind::Transport,
            ReconError::Authenticity(_) => ErrorKind::Authenticity,
            ReconError::Duplicate { .. } => ErrorKind::Duplicate,
            ReconError::Validation(_) | ReconError::IntegrityMismatch { .. } => {
                ErrorKind::Validation
            }
            ReconError::VersionConflict(_)
            | ReconError::Storage(_)
            | ReconError::IoError(_)
            | ReconError::CsvError(_)
            | ReconError::JsonError(_)
            | ReconError::ConfigError(_)
            | ReconError::InternalError(_) => ErrorKind::Infrastructure,
            #[cfg(feature = "storage-rocksdb")]
            ReconError::RocksDbError(_) => ErrorKind::Infrastructure,
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconError>;
