//! Boundary error taxonomy
//!
//! Every failure a caller of the settlement service can see is one of
//! these kinds. Validation kinds are caller mistakes. `VersionConflict` and
//! `Unavailable` may be retried after re-reading. `IllegalTransition` and
//! `Unauthorized` end the request and must reach the human actor.

use marche_escrow::EscrowError;
use marche_ledger::LedgerError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid commission rate: {0}")]
    InvalidRate(String),

    #[error("An escrow already exists for order {0}")]
    DuplicateOrder(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Illegal transition: {0}")]
    IllegalTransition(String),

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("A resolution note is required to resolve a dispute")]
    ResolutionNoteRequired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl SettlementError {
    /// Whether the caller may retry, after re-reading current state
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::VersionConflict(_) | Self::Unavailable(_))
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::InvalidRate(_) => "INVALID_RATE",
            Self::DuplicateOrder(_) => "DUPLICATE_ORDER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::IllegalTransition(_) => "ILLEGAL_TRANSITION",
            Self::VersionConflict(_) => "VERSION_CONFLICT",
            Self::ResolutionNoteRequired => "RESOLUTION_NOTE_REQUIRED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

impl From<EscrowError> for SettlementError {
    fn from(e: EscrowError) -> Self {
        let message = e.to_string();
        match e {
            EscrowError::InvalidAmount { .. } => Self::InvalidAmount(message),
            EscrowError::InvalidRate { .. } => Self::InvalidRate(message),
            EscrowError::ResolutionNoteRequired => Self::ResolutionNoteRequired,
            EscrowError::DuplicateOrder { order_id } => Self::DuplicateOrder(order_id),
            EscrowError::NotFound { escrow_id } => Self::NotFound(escrow_id),
            EscrowError::IllegalTransition { .. } => Self::IllegalTransition(message),
            EscrowError::VersionConflict { .. } => Self::VersionConflict(message),
            EscrowError::Unauthorized { .. } => Self::Unauthorized(message),
            EscrowError::Unavailable { message } => Self::Unavailable(message),
            EscrowError::Invariant { .. } => {
                error!(error = %message, "Ledger invariant violated");
                Self::Unavailable(message)
            }
        }
    }
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        EscrowError::from(e).into()
    }
}

pub type Result<T> = std::result::Result<T, SettlementError>;
