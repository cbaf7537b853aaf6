//! Marche Escrow - the escrow engine
//!
//! - [`commission`]: pure seller/platform split
//! - [`EscrowStateMachine`]: legal transitions, committed by compare-and-swap
//! - [`DisputeResolver`]: adjudication policy over the disputed branch
//! - [`CreditDispatcher`]: post-commit wallet credits with retry
//!
//! Funds held in escrow never move directly. A terminal transition writes
//! its credit instructions to the ledger outbox atomically with the status,
//! and the dispatcher delivers them afterwards.

pub mod commission;
mod dispatch;
mod dispute;
mod error;
mod machine;
pub mod policy;

pub use commission::CommissionSplit;
pub use dispatch::{CreditDispatcher, DispatchReport};
pub use dispute::DisputeResolver;
pub use error::{EscrowError, Result};
pub use machine::EscrowStateMachine;
