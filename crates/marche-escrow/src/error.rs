//! Escrow engine errors

use marche_ledger::LedgerError;
use marche_types::{EscrowOperation, EscrowStatus, ValidationError};
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    // ========== Validation ==========
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    #[error("Invalid commission rate: {rate}")]
    InvalidRate { rate: Decimal },

    #[error("A resolution note is required to resolve a dispute")]
    ResolutionNoteRequired,

    // ========== State ==========
    #[error("An escrow already exists for order {order_id}")]
    DuplicateOrder { order_id: String },

    #[error("Escrow not found: {escrow_id}")]
    NotFound { escrow_id: String },

    #[error("Cannot {operation} escrow {escrow_id} while {from}")]
    IllegalTransition {
        escrow_id: String,
        from: EscrowStatus,
        operation: EscrowOperation,
    },

    #[error("Version conflict on {escrow_id}: expected {expected}, found {actual}")]
    VersionConflict {
        escrow_id: String,
        expected: u64,
        actual: u64,
    },

    // ========== Authorization ==========
    #[error("{actor} may not {operation}")]
    Unauthorized { actor: String, operation: String },

    // ========== Infrastructure ==========
    #[error("Ledger store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Ledger invariant violated: {message}")]
    Invariant { message: String },
}

impl From<LedgerError> for EscrowError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NotFound { escrow_id } => Self::NotFound { escrow_id },
            LedgerError::DuplicateOrder { order_id } => Self::DuplicateOrder { order_id },
            LedgerError::VersionConflict {
                escrow_id,
                expected,
                actual,
            } => Self::VersionConflict {
                escrow_id,
                expected,
                actual,
            },
            LedgerError::Unavailable { message } => Self::Unavailable { message },
            LedgerError::Invariant { message } => Self::Invariant { message },
            LedgerError::CreditNotFound { key } => Self::Invariant {
                message: format!("credit {} missing from outbox", key),
            },
        }
    }
}

impl From<ValidationError> for EscrowError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::InvalidRate { rate } => Self::InvalidRate { rate },
            other => Self::InvalidAmount {
                message: other.to_string(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
