//! Marche Wallet - credits to user and platform wallet accounts
//!
//! The escrow engine never moves money itself. Every payout or refund is a
//! credit instruction handed to a [`WalletService`] together with an
//! idempotency key, so replays after a crash or retry are harmless.
//!
//! - [`InMemoryWallet`]: balances in memory, for tests and development
//! - [`HttpWalletService`]: JSON over HTTP to an external wallet service

mod http;
mod memory;

use async_trait::async_trait;
use marche_types::{AccountId, CurrencyCode, IdempotencyKey, MinorUnits};
use thiserror::Error;

pub use http::{HttpWalletConfig, HttpWalletService};
pub use memory::{CreditRecord, InMemoryWallet};

/// Errors returned by wallet services
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Transient failure; the same credit may be retried with the same key
    #[error("Wallet service unavailable: {message}")]
    Unavailable { message: String },

    /// The wallet refused the credit; retrying will not help
    #[error("Wallet rejected credit: {message}")]
    Rejected { message: String },
}

impl WalletError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

/// What the wallet did with a credit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// Balance was credited
    Applied,
    /// The key was seen before; nothing changed
    AlreadyApplied,
}

/// External wallet collaborator
#[async_trait]
pub trait WalletService: Send + Sync {
    /// Credit `amount` to `account`. At most once per `key`.
    async fn credit(
        &self,
        account: &AccountId,
        amount: MinorUnits,
        currency: &CurrencyCode,
        key: &IdempotencyKey,
    ) -> Result<CreditOutcome>;
}
