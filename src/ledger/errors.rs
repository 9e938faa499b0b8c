//! # Ledger Error Types
//!
//! Storage failures translated once from the driver, so callers above the
//! ledger never match on `sqlx::Error`.

use sqlx::postgres::PgDatabaseError;
use thiserror::Error;

use crate::database::PgErrorCode;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: String, key: String },

    /// Duplicate key; `detail` is the driver's description of the clash
    #[error("Unique constraint violated: {detail}")]
    UniqueViolation { detail: String },

    #[error("Constraint violated: {detail}")]
    ConstraintViolation { detail: String },

    #[error("Database error during {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("Stored row is inconsistent: {message}")]
    Corrupt { message: String },
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, key: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.to_string(),
        }
    }

    pub fn database(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Translate a driver error raised while performing `operation`
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::not_found(operation, "no rows returned"),
            sqlx::Error::ColumnDecode { index, source } => Self::Corrupt {
                message: format!("{operation}: column {index}: {source}"),
            },
            sqlx::Error::Database(db_err) => {
                let detail = db_err
                    .try_downcast_ref::<PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_string)
                    .unwrap_or_else(|| db_err.message().to_string());

                match db_err.code().as_deref() {
                    Some(code) if PgErrorCode::is_unique_violation(code) => {
                        Self::UniqueViolation { detail }
                    }
                    Some(code) if PgErrorCode::is_check_violation(code) => {
                        Self::ConstraintViolation { detail }
                    }
                    _ => Self::database(operation, db_err.to_string()),
                }
            }
            other => Self::database(operation, other.to_string()),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlx_translation() {
        let err = LedgerError::from_sqlx("message.find", sqlx::Error::RowNotFound);
        assert!(matches!(err, LedgerError::NotFound { .. }));

        let err = LedgerError::from_sqlx("credit.lock", sqlx::Error::PoolTimedOut);
        assert!(matches!(
            err,
            LedgerError::Database { ref operation, .. } if operation == "credit.lock"
        ));
    }

    #[test]
    fn test_error_display() {
        let err = LedgerError::not_found("outbox", 9);
        assert_eq!(err.to_string(), "outbox not found: 9");
    }
}
