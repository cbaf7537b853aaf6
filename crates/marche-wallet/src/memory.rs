//! In-memory wallet

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use marche_types::{AccountId, CurrencyCode, IdempotencyKey, MinorUnits};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{CreditOutcome, Result, WalletError, WalletService};

/// One applied credit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRecord {
    pub key: IdempotencyKey,
    pub account: AccountId,
    pub amount: MinorUnits,
    pub currency: CurrencyCode,
}

#[derive(Default)]
struct WalletState {
    balances: HashMap<(AccountId, CurrencyCode), i64>,
    applied: HashMap<IdempotencyKey, CreditRecord>,
    log: Vec<CreditRecord>,
    failures_remaining: u32,
    offline: bool,
}

/// Idempotent in-memory wallet with fault injection
#[derive(Clone, Default)]
pub struct InMemoryWallet {
    state: Arc<RwLock<WalletState>>,
}

impl InMemoryWallet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of an account in one currency
    pub async fn balance(&self, account: &AccountId, currency: &CurrencyCode) -> MinorUnits {
        let state = self.state.read().await;
        MinorUnits(
            state
                .balances
                .get(&(account.clone(), currency.clone()))
                .copied()
                .unwrap_or(0),
        )
    }

    /// Applied credits in order
    pub async fn credits(&self) -> Vec<CreditRecord> {
        self.state.read().await.log.clone()
    }

    /// Fail the next `count` credit calls with `Unavailable`
    pub async fn fail_next(&self, count: u32) {
        self.state.write().await.failures_remaining = count;
    }

    /// Fail every call until switched back
    pub async fn set_offline(&self, offline: bool) {
        self.state.write().await.offline = offline;
    }
}

#[async_trait]
impl WalletService for InMemoryWallet {
    async fn credit(
        &self,
        account: &AccountId,
        amount: MinorUnits,
        currency: &CurrencyCode,
        key: &IdempotencyKey,
    ) -> Result<CreditOutcome> {
        let mut state = self.state.write().await;

        if state.offline {
            return Err(WalletError::Unavailable {
                message: "wallet offline".to_string(),
            });
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(WalletError::Unavailable {
                message: "injected failure".to_string(),
            });
        }

        if let Some(existing) = state.applied.get(key) {
            if existing.account != *account || existing.amount != amount || existing.currency != *currency {
                return Err(WalletError::Rejected {
                    message: format!("idempotency key {} reused with a different credit", key),
                });
            }
            debug!(%key, "Credit replay ignored");
            return Ok(CreditOutcome::AlreadyApplied);
        }
        if !amount.is_positive() {
            return Err(WalletError::Rejected {
                message: format!("credit amount must be positive, got {}", amount),
            });
        }

        let record = CreditRecord {
            key: key.clone(),
            account: account.clone(),
            amount,
            currency: currency.clone(),
        };
        *state
            .balances
            .entry((account.clone(), currency.clone()))
            .or_insert(0) += amount.0;
        state.applied.insert(key.clone(), record.clone());
        state.log.push(record);

        debug!(%key, %account, %amount, "Credit applied");
        Ok(CreditOutcome::Applied)
    }
}
