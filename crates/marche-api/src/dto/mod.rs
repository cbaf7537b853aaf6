//! Request and query DTOs
//!
//! Responses reuse [`marche_types::EscrowView`] and
//! [`marche_types::AuditEntry`] directly.

mod escrow;

pub use escrow::*;
