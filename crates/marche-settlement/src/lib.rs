//! Marche Settlement - the escrow engine's public façade
//!
//! [`SettlementService`] is what HTTP handlers, the delivery webhook, the
//! admin UI and the scheduler call. It owns no mutable state; the ledger
//! store is the single source of truth.
//!
//! # Example
//!
//! ```ignore
//! let service = SettlementService::new(store, wallet, EscrowConfig::default());
//! let escrow = service.create(captured, Actor::system()).await?;
//! service.confirm_delivery(&escrow.id, Actor::customer(escrow.customer_id)).await?;
//! service.release(&escrow.id, Actor::customer(escrow.customer_id)).await?;
//! ```

mod config;
mod error;
mod notify;
mod orders;
mod service;

pub use config::EscrowConfig;
pub use error::{Result, SettlementError};
pub use notify::{BroadcastNotifier, LogNotifier, NotifyError, Notifier};
pub use orders::{CaptureEventOrders, InMemoryOrderDirectory, OrderDirectory};
pub use service::{SettlementService, SweepReport};

pub use marche_escrow::DispatchReport;
