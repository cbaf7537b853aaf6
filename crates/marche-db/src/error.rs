//! Database error types

use marche_ledger::LedgerError;
use marche_types::ValidationError;
use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Duplicate: {0}")]
    Duplicate(String),

    /// A stored row does not decode into a valid domain value
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl DbError {
    /// Whether the error is a unique-constraint violation
    pub fn is_unique_violation(&self) -> bool {
        match self {
            DbError::Query(sqlx::Error::Database(e)) => e.is_unique_violation(),
            DbError::Duplicate(_) => true,
            _ => false,
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(e: ValidationError) -> Self {
        DbError::Corrupt(e.to_string())
    }
}

impl From<DbError> for LedgerError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(escrow_id) => LedgerError::NotFound { escrow_id },
            DbError::Duplicate(order_id) => LedgerError::DuplicateOrder { order_id },
            DbError::Corrupt(message) => LedgerError::Invariant { message },
            other => LedgerError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;
