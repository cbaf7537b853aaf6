//! Settlement service façade
//!
//! The only entry point for HTTP handlers, webhooks and schedulers. Adds
//! input validation, translation into [`SettlementError`], event emission
//! after each applied transition, and read-only queries.
//!
//! Callers never see the concurrency token. Each write reads the current
//! version and hands it to the state machine, so a concurrent winner
//! surfaces as `VersionConflict` and a retry re-validates against the new
//! status.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use marche_escrow::{CreditDispatcher, DispatchReport, DisputeResolver, EscrowError, EscrowStateMachine};
use marche_ledger::{BoundedLedger, LedgerStore};
use marche_types::{
    AccountId, Actor, AuditEntry, DisputeAction, EscrowEvent, EscrowEventKind, EscrowFilter,
    EscrowId, EscrowStatus, EscrowTransaction, EscrowView, PaymentCaptured, Role, UserId,
};
use marche_wallet::WalletService;
use tracing::{info, warn};

use crate::{
    CaptureEventOrders, EscrowConfig, LogNotifier, Notifier, OrderDirectory, Result,
    SettlementError,
};

/// Outcome of one scheduler sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Escrows acted on
    pub processed: usize,
    /// Escrows another actor moved first
    pub skipped: usize,
    pub failed: usize,
}

pub struct SettlementService {
    store: Arc<dyn LedgerStore>,
    machine: EscrowStateMachine,
    disputes: DisputeResolver,
    orders: Arc<dyn OrderDirectory>,
    notifier: Arc<dyn Notifier>,
    config: EscrowConfig,
}

impl SettlementService {
    /// Wire the engine over a ledger store and a wallet.
    ///
    /// Every store call is bounded by `config.store_timeout_ms`.
    pub fn new(
        store: Arc<dyn LedgerStore>,
        wallet: Arc<dyn WalletService>,
        config: EscrowConfig,
    ) -> Self {
        let store: Arc<dyn LedgerStore> =
            Arc::new(BoundedLedger::new(store, config.store_timeout()));
        let dispatcher = CreditDispatcher::new(store.clone(), wallet);
        let machine = EscrowStateMachine::new(
            store.clone(),
            dispatcher,
            AccountId(config.platform_account.clone()),
        );
        Self {
            disputes: DisputeResolver::new(machine.clone()),
            machine,
            store,
            orders: Arc::new(CaptureEventOrders),
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    pub fn with_orders(mut self, orders: Arc<dyn OrderDirectory>) -> Self {
        self.orders = orders;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// Open an escrow for a captured payment
    pub async fn create(&self, event: PaymentCaptured, actor: Actor) -> Result<EscrowView> {
        if !event.total_amount.is_positive() {
            return Err(SettlementError::InvalidAmount(format!(
                "total amount must be positive, got {}",
                event.total_amount
            )));
        }
        if !self.orders.exists(&event.order_id).await? {
            return Err(SettlementError::NotFound(event.order_id.to_string()));
        }

        let tx = self.machine.create(&event, actor).await?;
        self.emit(EscrowEvent::new(EscrowEventKind::Created, &tx))
            .await;
        Ok(tx.into())
    }

    pub async fn confirm_delivery(&self, id: &EscrowId, actor: Actor) -> Result<EscrowView> {
        let version = self.current_version(id).await?;
        let tx = self.machine.confirm_delivery(id, actor, version).await?;
        Ok(self.applied(tx).await)
    }

    pub async fn release(&self, id: &EscrowId, actor: Actor) -> Result<EscrowView> {
        let version = self.current_version(id).await?;
        let tx = self.machine.release(id, actor, version).await?;
        Ok(self.applied(tx).await)
    }

    pub async fn open_dispute(&self, id: &EscrowId, actor: Actor, reason: &str) -> Result<EscrowView> {
        let version = self.current_version(id).await?;
        let tx = self.disputes.open(id, actor, version, reason).await?;
        Ok(self.applied(tx).await)
    }

    pub async fn resolve_dispute(
        &self,
        id: &EscrowId,
        actor: Actor,
        action: DisputeAction,
        resolution_note: &str,
    ) -> Result<EscrowView> {
        let version = self.current_version(id).await?;
        let tx = self
            .disputes
            .resolve(id, actor, version, action, resolution_note)
            .await?;
        Ok(self.applied(tx).await)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get(&self, id: &EscrowId, actor: Actor) -> Result<EscrowView> {
        let tx = self.store.get(id).await?;
        ensure_visible(&actor, &tx)?;
        Ok(tx.into())
    }

    /// Audit entries for one escrow, oldest first
    pub async fn audit_trail(&self, id: &EscrowId, actor: Actor) -> Result<Vec<AuditEntry>> {
        let tx = self.store.get(id).await?;
        ensure_visible(&actor, &tx)?;
        Ok(self.store.audit_trail(id).await?)
    }

    pub async fn list_by_customer(&self, customer_id: UserId, actor: Actor) -> Result<Vec<EscrowView>> {
        self.list(EscrowFilter::by_customer(customer_id), actor).await
    }

    pub async fn list_by_seller(&self, seller_id: UserId, actor: Actor) -> Result<Vec<EscrowView>> {
        self.list(EscrowFilter::by_seller(seller_id), actor).await
    }

    /// Escrows still holding funds
    pub async fn list_active(&self, actor: Actor) -> Result<Vec<EscrowView>> {
        self.list(EscrowFilter::by_statuses(&EscrowStatus::ACTIVE), actor)
            .await
    }

    pub async fn list_disputed(&self, actor: Actor) -> Result<Vec<EscrowView>> {
        self.list(EscrowFilter::by_statuses(&[EscrowStatus::Disputed]), actor)
            .await
    }

    /// Listing with customer and seller actors confined to their own escrows
    pub async fn list(&self, filter: EscrowFilter, actor: Actor) -> Result<Vec<EscrowView>> {
        let filter = scoped(&actor, filter)?;
        let escrows = self.store.list(&filter).await?;
        Ok(escrows.into_iter().map(EscrowView::from).collect())
    }

    // ========================================================================
    // Scheduler entry points
    // ========================================================================

    /// Release every delivered escrow whose grace period ended before `now`
    pub async fn auto_release_due(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let filter = EscrowFilter {
            statuses: vec![EscrowStatus::Delivered],
            delivered_before: Some(now - self.config.auto_release_grace()),
            limit: Some(self.config.sweep_batch_size),
            ..Default::default()
        };
        let due = self.store.list(&filter).await?;

        let mut report = SweepReport::default();
        for tx in due {
            match self.machine.release(&tx.id, Actor::system(), tx.version).await {
                Ok(released) => {
                    report.processed += 1;
                    self.applied(released).await;
                }
                Err(EscrowError::VersionConflict { .. } | EscrowError::IllegalTransition { .. }) => {
                    info!(escrow_id = %tx.id, "Escrow moved before auto-release, skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(escrow_id = %tx.id, error = %e, "Auto-release failed");
                    report.failed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                released = report.processed,
                skipped = report.skipped,
                failed = report.failed,
                "Auto-release sweep finished"
            );
        }
        Ok(report)
    }

    /// Announce every dispute open longer than the escalation threshold.
    /// Changes no state.
    pub async fn escalate_stale_disputes(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let filter = EscrowFilter {
            statuses: vec![EscrowStatus::Disputed],
            disputed_before: Some(now - self.config.dispute_escalation()),
            limit: Some(self.config.sweep_batch_size),
            ..Default::default()
        };
        let stale = self.store.list(&filter).await?;
        for tx in &stale {
            warn!(escrow_id = %tx.id, disputed_at = ?tx.disputed_at, "Dispute escalated");
            self.emit(EscrowEvent::new(EscrowEventKind::DisputeEscalated, tx))
                .await;
        }
        Ok(SweepReport {
            processed: stale.len(),
            ..Default::default()
        })
    }

    /// Re-drive undelivered wallet credits
    pub async fn retry_pending_credits(&self) -> Result<DispatchReport> {
        Ok(self
            .machine
            .dispatcher()
            .retry_pending(self.config.sweep_batch_size)
            .await?)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn current_version(&self, id: &EscrowId) -> Result<u64> {
        Ok(self.store.get(id).await?.version)
    }

    async fn applied(&self, tx: EscrowTransaction) -> EscrowView {
        self.emit(EscrowEvent::for_transition(&tx)).await;
        tx.into()
    }

    async fn emit(&self, event: EscrowEvent) {
        if let Err(e) = self.notifier.notify(&event).await {
            metrics::counter!("escrow_notifications_failed_total").increment(1);
            warn!(event = event.kind.name(), escrow_id = %event.escrow.id, error = %e, "Notification failed");
        }
    }
}

fn unauthorized_read(actor: &Actor) -> SettlementError {
    SettlementError::Unauthorized(format!("{} may only read own escrows", actor))
}

fn ensure_visible(actor: &Actor, tx: &EscrowTransaction) -> Result<()> {
    let visible = match actor.role {
        Role::Customer => tx.customer_id == actor.user_id,
        Role::Seller => tx.seller_id == actor.user_id,
        Role::Admin | Role::Adjudicator | Role::System => true,
    };
    if visible {
        Ok(())
    } else {
        Err(unauthorized_read(actor))
    }
}

fn scoped(actor: &Actor, mut filter: EscrowFilter) -> Result<EscrowFilter> {
    let own = match actor.role {
        Role::Customer => &mut filter.customer_id,
        Role::Seller => &mut filter.seller_id,
        Role::Admin | Role::Adjudicator | Role::System => return Ok(filter),
    };
    if let Some(requested) = *own {
        if requested != actor.user_id {
            return Err(unauthorized_read(actor));
        }
    }
    *own = Some(actor.user_id);
    Ok(filter)
}
