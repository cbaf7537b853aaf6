//! Escrow state machine
//!
//! Every operation reads a snapshot, checks the actor, the expected version
//! and the transition table against it, then commits through the ledger's
//! compare-and-swap. The snapshot checks are valid because the swap only
//! lands when the stored version still equals the snapshot's.
//!
//! Rejected attempts are audited. An unknown escrow id is not.

use std::sync::Arc;

use chrono::Utc;
use marche_ledger::{LedgerError, LedgerStore, Mutation};
use marche_types::{
    AccountId, Actor, AuditAction, AuditEntry, CreditInstruction, DisputeAction, EscrowId,
    EscrowOperation, EscrowStatus, EscrowTransaction, PaymentCaptured,
};
use tracing::{error, info, warn};

use crate::commission;
use crate::dispatch::CreditDispatcher;
use crate::policy;
use crate::{EscrowError, Result};

/// Escrow lifecycle engine
#[derive(Clone)]
pub struct EscrowStateMachine {
    store: Arc<dyn LedgerStore>,
    dispatcher: CreditDispatcher,
    platform_account: AccountId,
}

impl EscrowStateMachine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        dispatcher: CreditDispatcher,
        platform_account: AccountId,
    ) -> Self {
        Self {
            store,
            dispatcher,
            platform_account,
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn dispatcher(&self) -> &CreditDispatcher {
        &self.dispatcher
    }

    /// Open a pending escrow for a captured payment
    pub async fn create(&self, event: &PaymentCaptured, actor: Actor) -> Result<EscrowTransaction> {
        if !policy::may_create(&actor) {
            warn!(%actor, order_id = %event.order_id, "Escrow creation refused");
            return Err(EscrowError::Unauthorized {
                actor: actor.to_string(),
                operation: "create".to_string(),
            });
        }

        let split = commission::split(event.total_amount, event.commission_rate)?;
        let tx = EscrowTransaction::open(event, split.seller_amount, split.commission_amount, Utc::now())?;
        let audit = AuditEntry::applied(
            tx.id,
            actor,
            AuditAction::Create,
            None,
            EscrowStatus::Pending,
            None,
        );

        self.store.create(tx.clone(), audit).await?;
        metrics::counter!("escrow_transitions_total", "operation" => "create", "outcome" => "applied")
            .increment(1);
        info!(
            escrow_id = %tx.id,
            order_id = %tx.order_id,
            total = %tx.total_amount,
            seller = %tx.seller_amount,
            commission = %tx.commission_amount,
            "Escrow created"
        );
        Ok(tx)
    }

    /// `pending -> delivered`. Moves no money.
    pub async fn confirm_delivery(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
    ) -> Result<EscrowTransaction> {
        self.transition(id, actor, expected_version, EscrowOperation::ConfirmDelivery, None)
            .await
    }

    /// `delivered|disputed -> released`. Pays seller and platform.
    pub async fn release(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
    ) -> Result<EscrowTransaction> {
        self.transition(id, actor, expected_version, EscrowOperation::Release, None)
            .await
    }

    /// `pending|delivered -> disputed`. Moves no money.
    pub async fn open_dispute(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
        reason: &str,
    ) -> Result<EscrowTransaction> {
        let reason = Some(reason.trim().to_string()).filter(|r| !r.is_empty());
        self.transition(id, actor, expected_version, EscrowOperation::OpenDispute, reason)
            .await
    }

    /// `disputed -> released|refunded`. Reached through the dispute resolver,
    /// which owns the adjudication check.
    pub(crate) async fn resolve_dispute(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
        action: DisputeAction,
        resolution_note: &str,
    ) -> Result<EscrowTransaction> {
        let note = resolution_note.trim();
        let op = EscrowOperation::ResolveDispute(action);
        if note.is_empty() {
            let current = self.store.get(id).await?;
            return Err(self
                .reject(&current, actor, op, None, EscrowError::ResolutionNoteRequired)
                .await);
        }
        self.transition(id, actor, expected_version, op, Some(note.to_string()))
            .await
    }

    /// Audit a refused attempt and hand back the error
    pub(crate) async fn reject(
        &self,
        current: &EscrowTransaction,
        actor: Actor,
        op: EscrowOperation,
        note: Option<String>,
        err: EscrowError,
    ) -> EscrowError {
        let outcome = match &err {
            EscrowError::IllegalTransition { .. } => "illegal_transition",
            EscrowError::VersionConflict { .. } => "version_conflict",
            EscrowError::Unauthorized { .. } => "unauthorized",
            EscrowError::ResolutionNoteRequired => "note_required",
            _ => "rejected",
        };
        metrics::counter!("escrow_transitions_total", "operation" => op.as_str(), "outcome" => outcome)
            .increment(1);
        warn!(
            escrow_id = %current.id,
            status = %current.status,
            operation = %op,
            %actor,
            error = %err,
            "Escrow transition rejected"
        );

        let entry = AuditEntry::rejected(
            current.id,
            actor,
            AuditAction::Transition(op),
            Some(current.status),
            err.to_string(),
            note,
        );
        if let Err(audit_err) = self.store.append_audit(entry).await {
            error!(escrow_id = %current.id, error = %audit_err, "Failed to audit rejected transition");
        }
        err
    }

    async fn transition(
        &self,
        id: &EscrowId,
        actor: Actor,
        expected_version: u64,
        op: EscrowOperation,
        note: Option<String>,
    ) -> Result<EscrowTransaction> {
        let current = self.store.get(id).await?;

        if !policy::may_apply(&actor, &current, op) {
            let err = EscrowError::Unauthorized {
                actor: actor.to_string(),
                operation: op.to_string(),
            };
            return Err(self.reject(&current, actor, op, note, err).await);
        }

        if current.version != expected_version {
            let err = EscrowError::VersionConflict {
                escrow_id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            };
            return Err(self.reject(&current, actor, op, note, err).await);
        }

        let Some(target) = current.status.apply(op) else {
            let err = EscrowError::IllegalTransition {
                escrow_id: id.to_string(),
                from: current.status,
                operation: op,
            };
            return Err(self.reject(&current, actor, op, note, err).await);
        };

        let credits = match target {
            EscrowStatus::Released => CreditInstruction::for_release(&current, &self.platform_account),
            EscrowStatus::Refunded => CreditInstruction::for_refund(&current),
            _ => Vec::new(),
        };

        let audit = AuditEntry::applied(
            current.id,
            actor,
            AuditAction::Transition(op),
            Some(current.status),
            target,
            note.clone(),
        );
        let now = Utc::now();
        let mutation = Mutation::new(expected_version, audit, move |tx| {
            apply_transition(tx, op, target, note, now)
        })
        .with_credits(credits.clone());

        let updated = match self.store.compare_and_swap(id, mutation).await {
            Ok(updated) => updated,
            Err(LedgerError::VersionConflict {
                escrow_id,
                expected,
                actual,
            }) => {
                let err = EscrowError::VersionConflict {
                    escrow_id,
                    expected,
                    actual,
                };
                return Err(self.reject(&current, actor, op, None, err).await);
            }
            Err(e) => {
                error!(escrow_id = %id, operation = %op, error = %e, "Ledger write failed");
                return Err(e.into());
            }
        };

        metrics::counter!("escrow_transitions_total", "operation" => op.as_str(), "outcome" => "applied")
            .increment(1);
        info!(
            escrow_id = %id,
            from = %current.status,
            to = %updated.status,
            %actor,
            version = updated.version,
            "Escrow transition applied"
        );

        if !credits.is_empty() {
            self.dispatcher.dispatch(&credits).await;
        }
        Ok(updated)
    }
}

/// Write the target status and the timestamp that goes with it
fn apply_transition(
    tx: &mut EscrowTransaction,
    op: EscrowOperation,
    target: EscrowStatus,
    note: Option<String>,
    now: chrono::DateTime<Utc>,
) {
    let at = tx.next_timestamp(now);
    tx.status = target;
    tx.updated_at = at;
    match op {
        EscrowOperation::ConfirmDelivery => tx.delivery_confirmed_at = Some(at),
        EscrowOperation::OpenDispute => {
            tx.disputed_at = Some(at);
            tx.dispute_reason = note;
        }
        EscrowOperation::Release => tx.released_at = Some(at),
        EscrowOperation::ResolveDispute(action) => {
            tx.resolution = note;
            match action {
                DisputeAction::Release => tx.released_at = Some(at),
                DisputeAction::Refund => tx.refunded_at = Some(at),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marche_ledger::InMemoryLedgerStore;
    use marche_types::{AuditOutcome, CommissionRate, CurrencyCode, MinorUnits, OrderId, UserId};
    use marche_wallet::InMemoryWallet;
    use rust_decimal_macros::dec;

    struct Harness {
        machine: EscrowStateMachine,
        store: InMemoryLedgerStore,
        wallet: InMemoryWallet,
    }

    fn harness() -> Harness {
        let store = InMemoryLedgerStore::new();
        let wallet = InMemoryWallet::new();
        let shared: Arc<dyn LedgerStore> = Arc::new(store.clone());
        let dispatcher = CreditDispatcher::new(shared.clone(), Arc::new(wallet.clone()));
        Harness {
            machine: EscrowStateMachine::new(shared, dispatcher, AccountId::platform()),
            store,
            wallet,
        }
    }

    fn captured() -> PaymentCaptured {
        PaymentCaptured {
            order_id: OrderId::new(),
            customer_id: UserId::new(),
            seller_id: UserId::new(),
            total_amount: MinorUnits(100_000),
            currency: CurrencyCode::new("XOF").unwrap(),
            commission_rate: CommissionRate::new(dec!(0.15)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_create_splits_and_audits() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();
        assert_eq!(tx.status, EscrowStatus::Pending);
        assert_eq!(tx.seller_amount, MinorUnits(85_000));
        assert_eq!(tx.commission_amount, MinorUnits(15_000));
        assert_eq!(tx.version, 0);
        assert_eq!(h.store.audit_trail(&tx.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_customer_cannot_create() {
        let h = harness();
        let event = captured();
        let err = h
            .machine
            .create(&event, Actor::customer(event.customer_id))
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_confirm_then_release_pays_both_legs() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();
        let customer = Actor::customer(tx.customer_id);

        let delivered = h.machine.confirm_delivery(&tx.id, customer, 0).await.unwrap();
        assert_eq!(delivered.status, EscrowStatus::Delivered);
        assert!(delivered.delivery_confirmed_at.is_some());
        assert!(h.wallet.credits().await.is_empty());

        let released = h.machine.release(&tx.id, customer, 1).await.unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert!(released.released_at >= released.delivery_confirmed_at);

        assert_eq!(
            h.wallet.balance(&AccountId::for_user(&tx.seller_id), &tx.currency).await,
            MinorUnits(85_000)
        );
        assert_eq!(
            h.wallet.balance(&AccountId::platform(), &tx.currency).await,
            MinorUnits(15_000)
        );
    }

    #[tokio::test]
    async fn test_illegal_transition_is_audited() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();

        let err = h.machine.release(&tx.id, Actor::system(), 0).await.unwrap_err();
        assert!(matches!(
            err,
            EscrowError::IllegalTransition {
                from: EscrowStatus::Pending,
                operation: EscrowOperation::Release,
                ..
            }
        ));

        let trail = h.store.audit_trail(&tx.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert!(matches!(trail[1].outcome, AuditOutcome::Rejected { .. }));
        assert_eq!(h.store.get(&tx.id).await.unwrap().version, 0);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();
        let customer = Actor::customer(tx.customer_id);
        h.machine.confirm_delivery(&tx.id, customer, 0).await.unwrap();

        let err = h
            .machine
            .open_dispute(&tx.id, customer, 0, "never arrived")
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::VersionConflict { actual: 1, .. }));
    }

    #[tokio::test]
    async fn test_confirm_after_dispute_is_illegal() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();
        h.machine
            .open_dispute(&tx.id, Actor::seller(tx.seller_id), 0, "buyer unreachable")
            .await
            .unwrap();

        let err = h
            .machine
            .confirm_delivery(&tx.id, Actor::customer(tx.customer_id), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::IllegalTransition { .. }));

        let stored = h.store.get(&tx.id).await.unwrap();
        assert_eq!(stored.dispute_reason.as_deref(), Some("buyer unreachable"));
        assert!(stored.disputed_at.is_some());
    }

    #[tokio::test]
    async fn test_unauthorized_is_audited() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();

        let err = h
            .machine
            .confirm_delivery(&tx.id, Actor::seller(tx.seller_id), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::Unauthorized { .. }));
        assert_eq!(h.store.audit_trail(&tx.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_escrow() {
        let h = harness();
        let err = h
            .machine
            .confirm_delivery(&EscrowId::new(), Actor::system(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound { .. }));
        assert_eq!(h.store.audit_len().await, 0);
    }

    #[tokio::test]
    async fn test_release_survives_wallet_outage() {
        let h = harness();
        let tx = h.machine.create(&captured(), Actor::system()).await.unwrap();
        let customer = Actor::customer(tx.customer_id);
        h.machine.confirm_delivery(&tx.id, customer, 0).await.unwrap();

        h.wallet.set_offline(true).await;
        let released = h.machine.release(&tx.id, customer, 1).await.unwrap();
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(h.store.pending_credits(10).await.unwrap().len(), 2);

        h.wallet.set_offline(false).await;
        let report = h.machine.dispatcher().retry_pending(10).await.unwrap();
        assert_eq!(report.delivered, 2);
        assert_eq!(h.wallet.credits().await.len(), 2);
    }
}
