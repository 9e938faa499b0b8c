//! # Service Error Types
//!
//! Caller-facing error kinds. Lower layers (`LedgerError`, `MessagingError`,
//! `ProviderError`, `ConfigurationError`) keep their own detail and are folded
//! into one of these kinds at the service boundary.

use crate::config::ConfigurationError;
use crate::ledger::LedgerError;
use crate::messaging::MessagingError;
use crate::providers::ProviderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmsGateError {
    /// Malformed input, rejected before any side effect
    #[error("Validation error: {0}")]
    Validation(String),

    /// A business rule rejected the request (message too long, balance too low)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A unique constraint rejected a write; carries the driver's detail text
    #[error("Item already exists: {0}")]
    ItemExists(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Unexpected failure; the caller can only retry
    #[error("Operation failed: {0}")]
    Failed(String),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SmsGateError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Short machine-readable name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::ItemExists(_) => "item_exists",
            Self::NotFound(_) => "not_found",
            Self::Failed(_) => "failed",
            Self::Configuration(_) => "configuration",
            Self::Messaging(_) => "messaging",
            Self::Database(_) => "database",
        }
    }
}

impl From<LedgerError> for SmsGateError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound { entity, key } => Self::NotFound(format!("{entity} {key}")),
            LedgerError::UniqueViolation { detail } => Self::ItemExists(detail),
            other => Self::Failed(other.to_string()),
        }
    }
}

/// Provider failures surface as `Failed`
impl From<ProviderError> for SmsGateError {
    fn from(err: ProviderError) -> Self {
        Self::Failed(err.to_string())
    }
}

pub type SmsGateResult<T> = Result<T, SmsGateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_fold_into_service_kinds() {
        let err: SmsGateError = LedgerError::not_found("message", "42").into();
        assert!(matches!(err, SmsGateError::NotFound(ref m) if m == "message 42"));

        let err: SmsGateError = LedgerError::UniqueViolation {
            detail: "Key (id)=(\\x01) already exists.".to_string(),
        }
        .into();
        assert_eq!(err.kind(), "item_exists");
        assert!(err.to_string().contains("already exists"));

        let err: SmsGateError = LedgerError::database("commit", "connection reset").into();
        assert!(matches!(err, SmsGateError::Failed(_)));
    }

    #[test]
    fn test_error_display() {
        let err = SmsGateError::conflict("message text exceeds 160 characters");
        assert_eq!(
            err.to_string(),
            "Conflict: message text exceeds 160 characters"
        );
    }
}
