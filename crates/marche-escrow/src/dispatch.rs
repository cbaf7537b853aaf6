//! Post-commit wallet credit delivery
//!
//! Credit instructions are written to the ledger outbox in the same unit
//! as the terminal status. The dispatcher hands them to the wallet after
//! commit. A transient failure leaves the instruction pending for
//! [`CreditDispatcher::retry_pending`]; the wallet dedupes on the
//! idempotency key, so replays never credit twice. A credit the wallet
//! refuses outright is parked as rejected and left for manual
//! reconciliation.

use std::sync::Arc;

use marche_ledger::LedgerStore;
use marche_types::CreditInstruction;
use marche_wallet::{CreditOutcome, WalletService};
use tracing::{debug, error, info, warn};

use crate::Result;

/// Tally of one dispatch pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    /// Still pending, will be retried
    pub failed: usize,
    /// Refused by the wallet, out of the queue
    pub rejected: usize,
}

enum Delivery {
    Delivered,
    Failed,
    Rejected,
}

impl DispatchReport {
    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Failed => self.failed += 1,
            Delivery::Rejected => self.rejected += 1,
        }
    }
}

#[derive(Clone)]
pub struct CreditDispatcher {
    store: Arc<dyn LedgerStore>,
    wallet: Arc<dyn WalletService>,
}

impl CreditDispatcher {
    pub fn new(store: Arc<dyn LedgerStore>, wallet: Arc<dyn WalletService>) -> Self {
        Self { store, wallet }
    }

    /// Deliver freshly committed instructions. Never fails the caller.
    pub async fn dispatch(&self, credits: &[CreditInstruction]) -> DispatchReport {
        let mut report = DispatchReport::default();
        for credit in credits {
            report.record(self.deliver(credit).await);
        }
        report
    }

    /// Re-drive up to `limit` pending outbox entries, oldest first
    pub async fn retry_pending(&self, limit: usize) -> Result<DispatchReport> {
        let pending = self.store.pending_credits(limit).await?;
        let mut report = DispatchReport::default();
        for queued in &pending {
            report.record(self.deliver(&queued.instruction).await);
        }
        if !pending.is_empty() {
            info!(
                delivered = report.delivered,
                failed = report.failed,
                rejected = report.rejected,
                "Retried pending wallet credits"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, credit: &CreditInstruction) -> Delivery {
        let leg = credit.leg.as_str();
        match self
            .wallet
            .credit(&credit.account, credit.amount, &credit.currency, &credit.key)
            .await
        {
            Ok(outcome) => {
                let label = match outcome {
                    CreditOutcome::Applied => "applied",
                    CreditOutcome::AlreadyApplied => "already_applied",
                };
                metrics::counter!("escrow_wallet_credits_total", "leg" => leg, "outcome" => label)
                    .increment(1);
                debug!(key = %credit.key, account = %credit.account, amount = %credit.amount, outcome = label, "Wallet credit accepted");

                if let Err(e) = self.store.mark_credit_delivered(&credit.key).await {
                    // Stays pending; the next retry sees AlreadyApplied
                    warn!(key = %credit.key, error = %e, "Failed to mark credit delivered");
                }
                Delivery::Delivered
            }
            Err(e) if e.is_retryable() => {
                metrics::counter!("escrow_wallet_credits_total", "leg" => leg, "outcome" => "failed")
                    .increment(1);
                warn!(key = %credit.key, error = %e, "Wallet credit failed, queued for retry");

                if let Err(store_err) = self
                    .store
                    .record_credit_failure(&credit.key, &e.to_string())
                    .await
                {
                    warn!(key = %credit.key, error = %store_err, "Failed to record credit failure");
                }
                Delivery::Failed
            }
            Err(e) => {
                metrics::counter!("escrow_wallet_credits_total", "leg" => leg, "outcome" => "rejected")
                    .increment(1);
                error!(
                    key = %credit.key,
                    escrow_id = %credit.escrow_id,
                    account = %credit.account,
                    amount = %credit.amount,
                    error = %e,
                    "Wallet rejected credit, needs manual reconciliation"
                );

                if let Err(store_err) = self.store.reject_credit(&credit.key, &e.to_string()).await {
                    // Stays pending and is offered again on the next sweep
                    warn!(key = %credit.key, error = %store_err, "Failed to park rejected credit");
                }
                Delivery::Rejected
            }
        }
    }
}
