//! Validation errors for domain value construction

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised while building domain values from caller input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Amount is negative, zero where a positive value is required, or overflows
    #[error("Invalid amount: {message}")]
    InvalidAmount { message: String },

    /// Commission rate outside `[0, 1]`
    #[error("Invalid commission rate {rate}: must be between 0 and 1")]
    InvalidRate { rate: Decimal },

    /// Currency code is not three uppercase letters
    #[error("Invalid currency code: {code:?}")]
    InvalidCurrency { code: String },

    /// The split amounts do not add up to the total
    #[error("Amounts do not balance: seller {seller} + commission {commission} != total {total}")]
    Unbalanced {
        total: i64,
        seller: i64,
        commission: i64,
    },

    /// Unknown status or role string from storage or the wire
    #[error("Unknown {kind}: {value:?}")]
    UnknownVariant { kind: &'static str, value: String },
}
