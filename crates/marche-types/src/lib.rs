//! Marche Types - Canonical domain types for the escrow settlement engine
//!
//! This crate contains all foundational types with zero dependencies on other
//! marche crates. It defines:
//!
//! - Identity types (EscrowId, OrderId, UserId, AccountId, ...)
//! - Money types: integer minor units, currency codes, commission rates
//! - The escrow transaction record and its legal-transition table
//! - Audit entries, actors and roles
//! - Wallet credit instructions and their idempotency keys
//! - Domain events consumed by the notification collaborator
//!
//! # Invariants
//!
//! 1. Money is never floating point: amounts are `i64` minor units
//! 2. `seller_amount + commission_amount == total_amount` for every record
//! 3. Status only changes along the edges of [`EscrowStatus::apply`]
//! 4. Released and refunded are terminal

pub mod identity;
pub mod money;
pub mod escrow;
pub mod actor;
pub mod audit;
pub mod credit;
pub mod event;
pub mod error;

pub use identity::*;
pub use money::*;
pub use escrow::*;
pub use actor::*;
pub use audit::*;
pub use credit::*;
pub use event::*;
pub use error::*;
