//! Deadline decorator for ledger stores
//!
//! A call that outlives the deadline is reported as `Unavailable` and its
//! future is dropped. A compare-and-swap can time out after its write
//! already committed, so on expiry the decorator asks the store for the
//! outcome and returns the committed escrow when there is one.
//! `Unavailable` from a compare-and-swap therefore means the mutation was
//! not applied, or that its outcome could not be read back either.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use marche_types::{
    AuditEntry, AuditEntryId, EscrowFilter, EscrowId, EscrowTransaction, IdempotencyKey, OrderId,
    QueuedCredit,
};
use tracing::{error, info, warn};

use crate::{LedgerError, LedgerStore, Mutation, Result};

/// Wraps a [`LedgerStore`] and bounds every call by `timeout`
#[derive(Debug, Clone)]
pub struct BoundedLedger<S> {
    inner: S,
    timeout: Duration,
}

impl<S: LedgerStore> BoundedLedger<S> {
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout_ms = self.timeout.as_millis() as u64, "Ledger call timed out");
                Err(self.timed_out(op))
            }
        }
    }

    fn timed_out(&self, op: &str) -> LedgerError {
        LedgerError::Unavailable {
            message: format!("{} exceeded {}ms", op, self.timeout.as_millis()),
        }
    }

    /// Read back a compare-and-swap that timed out
    async fn reconcile(&self, id: &EscrowId, audit_id: &AuditEntryId) -> Result<EscrowTransaction> {
        let lookup = self.inner.committed_mutation(id, audit_id);
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(Some(committed))) => {
                info!(escrow_id = %id, version = committed.version, "Timed out swap had committed");
                Ok(committed)
            }
            Ok(Ok(None)) => Err(self.timed_out("compare_and_swap")),
            Ok(Err(e)) => {
                error!(escrow_id = %id, %audit_id, error = %e, "Could not read back timed out swap");
                Err(self.timed_out("compare_and_swap"))
            }
            Err(_) => {
                error!(escrow_id = %id, %audit_id, "Read back of timed out swap also timed out");
                Err(self.timed_out("compare_and_swap"))
            }
        }
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for BoundedLedger<S> {
    async fn create(&self, tx: EscrowTransaction, audit: AuditEntry) -> Result<EscrowId> {
        self.bounded("create", self.inner.create(tx, audit)).await
    }

    async fn get(&self, id: &EscrowId) -> Result<EscrowTransaction> {
        self.bounded("get", self.inner.get(id)).await
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<EscrowTransaction> {
        self.bounded("get_by_order", self.inner.get_by_order(order_id))
            .await
    }

    async fn compare_and_swap(&self, id: &EscrowId, mutation: Mutation) -> Result<EscrowTransaction> {
        let audit_id = mutation.audit.id;
        let swap = self.inner.compare_and_swap(id, mutation);
        match tokio::time::timeout(self.timeout, swap).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    escrow_id = %id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Compare-and-swap timed out, reading back its outcome"
                );
                self.reconcile(id, &audit_id).await
            }
        }
    }

    async fn committed_mutation(
        &self,
        id: &EscrowId,
        audit_id: &AuditEntryId,
    ) -> Result<Option<EscrowTransaction>> {
        self.bounded("committed_mutation", self.inner.committed_mutation(id, audit_id))
            .await
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.bounded("append_audit", self.inner.append_audit(entry))
            .await
    }

    async fn audit_trail(&self, id: &EscrowId) -> Result<Vec<AuditEntry>> {
        self.bounded("audit_trail", self.inner.audit_trail(id)).await
    }

    async fn list(&self, filter: &EscrowFilter) -> Result<Vec<EscrowTransaction>> {
        self.bounded("list", self.inner.list(filter)).await
    }

    async fn pending_credits(&self, limit: usize) -> Result<Vec<QueuedCredit>> {
        self.bounded("pending_credits", self.inner.pending_credits(limit))
            .await
    }

    async fn credits_for(&self, id: &EscrowId) -> Result<Vec<QueuedCredit>> {
        self.bounded("credits_for", self.inner.credits_for(id)).await
    }

    async fn mark_credit_delivered(&self, key: &IdempotencyKey) -> Result<()> {
        self.bounded("mark_credit_delivered", self.inner.mark_credit_delivered(key))
            .await
    }

    async fn record_credit_failure(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        self.bounded(
            "record_credit_failure",
            self.inner.record_credit_failure(key, error),
        )
        .await
    }

    async fn reject_credit(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        self.bounded("reject_credit", self.inner.reject_credit(key, error))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryLedgerStore;
    use chrono::Utc;
    use marche_types::{
        Actor, AuditAction, CommissionRate, CurrencyCode, EscrowOperation, EscrowStatus,
        MinorUnits, PaymentCaptured, UserId,
    };
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_fast_store_passes_through() {
        let store = BoundedLedger::new(InMemoryLedgerStore::new(), Duration::from_millis(500));
        let err = store.get(&EscrowId::new()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_is_unavailable() {
        let slow = InMemoryLedgerStore::with_latency(Duration::from_secs(5));
        let store = BoundedLedger::new(slow, Duration::from_millis(100));
        let err = store.list(&EscrowFilter::default()).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable { .. }));
    }

    fn open_escrow() -> (EscrowTransaction, AuditEntry) {
        let event = PaymentCaptured {
            order_id: OrderId::new(),
            customer_id: UserId::new(),
            seller_id: UserId::new(),
            total_amount: MinorUnits(10_000),
            currency: CurrencyCode::new("XOF").unwrap(),
            commission_rate: CommissionRate::new(dec!(0.1)).unwrap(),
        };
        let tx = EscrowTransaction::open(&event, MinorUnits(9_000), MinorUnits(1_000), Utc::now())
            .unwrap();
        let audit = AuditEntry::applied(
            tx.id,
            Actor::system(),
            AuditAction::Create,
            None,
            EscrowStatus::Pending,
            None,
        );
        (tx, audit)
    }

    fn confirm(tx: &EscrowTransaction) -> Mutation {
        let audit = AuditEntry::applied(
            tx.id,
            Actor::customer(tx.customer_id),
            AuditAction::Transition(EscrowOperation::ConfirmDelivery),
            Some(EscrowStatus::Pending),
            EscrowStatus::Delivered,
            None,
        );
        Mutation::new(0, audit, |tx| tx.status = EscrowStatus::Delivered)
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_committed_before_timeout_is_reported_applied() {
        let inner = InMemoryLedgerStore::new().with_commit_latency(Duration::from_secs(5));
        let store = BoundedLedger::new(inner.clone(), Duration::from_millis(100));
        let (tx, audit) = open_escrow();
        inner.create(tx.clone(), audit).await.unwrap();

        let updated = store.compare_and_swap(&tx.id, confirm(&tx)).await.unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.status, EscrowStatus::Delivered);
        assert_eq!(inner.get(&tx.id).await.unwrap(), updated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_swap_timed_out_before_commit_is_unavailable() {
        let inner = InMemoryLedgerStore::with_latency(Duration::from_secs(5));
        let store = BoundedLedger::new(inner.clone(), Duration::from_millis(100));
        let (tx, audit) = open_escrow();
        inner.create(tx.clone(), audit).await.unwrap();

        let err = store.compare_and_swap(&tx.id, confirm(&tx)).await.unwrap_err();
        assert!(matches!(err, LedgerError::Unavailable { .. }));
        assert_eq!(inner.get(&tx.id).await.unwrap().version, 0);
        assert_eq!(inner.audit_len().await, 1);
    }
}
