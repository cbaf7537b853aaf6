//! Marche Ledger - durable store for escrow transactions
//!
//! The ledger store is the single source of truth for escrow state. It holds:
//! - Escrow transactions, unique per order
//! - The append-only audit trail
//! - The wallet credit outbox, written in the same unit as the status change
//!
//! # Invariants
//!
//! 1. `compare_and_swap` is the only mutation path for an existing escrow
//! 2. A mutation is applied only when the stored version equals the expected one
//! 3. Status write, audit entry and credit instructions commit together or not at all
//! 4. Every stored escrow satisfies `seller_amount + commission_amount == total_amount`

mod bounded;
mod memory;

use async_trait::async_trait;
use marche_types::{
    AuditEntry, AuditEntryId, CreditInstruction, EscrowFilter, EscrowId, EscrowTransaction,
    IdempotencyKey, OrderId, QueuedCredit,
};
use thiserror::Error;

pub use bounded::BoundedLedger;
pub use memory::InMemoryLedgerStore;

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Escrow not found: {escrow_id}")]
    NotFound { escrow_id: String },

    #[error("An escrow already exists for order {order_id}")]
    DuplicateOrder { order_id: String },

    #[error("Version conflict on {escrow_id}: expected {expected}, found {actual}")]
    VersionConflict {
        escrow_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Credit instruction not found: {key}")]
    CreditNotFound { key: String },

    #[error("Invariant violated: {message}")]
    Invariant { message: String },

    #[error("Ledger store unavailable: {message}")]
    Unavailable { message: String },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Pure mutation applied to the stored record
pub type Mutator = Box<dyn FnOnce(&mut EscrowTransaction) + Send>;

/// A compare-and-swap request
///
/// `apply` runs against the stored record only if its version equals
/// `expected_version`. The audit entry and the credit instructions are
/// committed in the same unit as the mutated record.
pub struct Mutation {
    pub expected_version: u64,
    pub apply: Mutator,
    pub audit: AuditEntry,
    pub credits: Vec<CreditInstruction>,
}

impl Mutation {
    pub fn new(
        expected_version: u64,
        audit: AuditEntry,
        apply: impl FnOnce(&mut EscrowTransaction) + Send + 'static,
    ) -> Self {
        Self {
            expected_version,
            apply: Box::new(apply),
            audit,
            credits: Vec::new(),
        }
    }

    /// Attach wallet credits owed once the mutation commits
    pub fn with_credits(mut self, credits: Vec<CreditInstruction>) -> Self {
        self.credits = credits;
        self
    }
}

impl std::fmt::Debug for Mutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mutation")
            .field("expected_version", &self.expected_version)
            .field("audit", &self.audit)
            .field("credits", &self.credits)
            .finish_non_exhaustive()
    }
}

/// Check a mutated record against the stored one.
///
/// Identity, parties, amounts, rate, currency and creation time are fixed
/// for the life of an escrow, and the split must still balance.
pub fn verify_mutation(before: &EscrowTransaction, after: &EscrowTransaction) -> Result<()> {
    let unchanged = before.id == after.id
        && before.order_id == after.order_id
        && before.customer_id == after.customer_id
        && before.seller_id == after.seller_id
        && before.total_amount == after.total_amount
        && before.seller_amount == after.seller_amount
        && before.commission_amount == after.commission_amount
        && before.commission_rate == after.commission_rate
        && before.currency == after.currency
        && before.created_at == after.created_at;
    if !unchanged {
        return Err(LedgerError::Invariant {
            message: format!("mutation touched immutable fields of {}", before.id),
        });
    }
    after.check_balanced().map_err(|e| LedgerError::Invariant {
        message: e.to_string(),
    })
}

/// Durable transactional access to escrows, audit entries and the credit outbox
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a new escrow together with its creation audit entry.
    ///
    /// Fails with `DuplicateOrder` if the order already has an escrow.
    async fn create(&self, tx: EscrowTransaction, audit: AuditEntry) -> Result<EscrowId>;

    /// Fetch an escrow by id
    async fn get(&self, id: &EscrowId) -> Result<EscrowTransaction>;

    /// Fetch the escrow attached to an order
    async fn get_by_order(&self, order_id: &OrderId) -> Result<EscrowTransaction>;

    /// Apply `mutation` if the stored version still matches, bumping the version.
    async fn compare_and_swap(&self, id: &EscrowId, mutation: Mutation) -> Result<EscrowTransaction>;

    /// Outcome of a compare-and-swap whose reply never arrived.
    ///
    /// Waits for any write still in flight on `id`, then returns the stored
    /// escrow if the mutation audited as `audit_id` committed, `None` if it
    /// did not.
    async fn committed_mutation(
        &self,
        id: &EscrowId,
        audit_id: &AuditEntryId,
    ) -> Result<Option<EscrowTransaction>>;

    /// Append a standalone audit entry (rejected attempts)
    async fn append_audit(&self, entry: AuditEntry) -> Result<()>;

    /// Audit entries for one escrow, oldest first
    async fn audit_trail(&self, id: &EscrowId) -> Result<Vec<AuditEntry>>;

    /// Escrows matching `filter`, newest first
    async fn list(&self, filter: &EscrowFilter) -> Result<Vec<EscrowTransaction>>;

    /// Undelivered credit instructions, oldest first
    async fn pending_credits(&self, limit: usize) -> Result<Vec<QueuedCredit>>;

    /// Every credit instruction recorded for an escrow
    async fn credits_for(&self, id: &EscrowId) -> Result<Vec<QueuedCredit>>;

    /// Mark a credit as accepted by the wallet service
    async fn mark_credit_delivered(&self, key: &IdempotencyKey) -> Result<()>;

    /// Record a failed delivery attempt; the credit stays pending
    async fn record_credit_failure(&self, key: &IdempotencyKey, error: &str) -> Result<()>;

    /// Take a credit the wallet refused out of the pending queue
    async fn reject_credit(&self, key: &IdempotencyKey, error: &str) -> Result<()>;
}

#[async_trait]
impl<T: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<T> {
    async fn create(&self, tx: EscrowTransaction, audit: AuditEntry) -> Result<EscrowId> {
        (**self).create(tx, audit).await
    }

    async fn get(&self, id: &EscrowId) -> Result<EscrowTransaction> {
        (**self).get(id).await
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<EscrowTransaction> {
        (**self).get_by_order(order_id).await
    }

    async fn compare_and_swap(&self, id: &EscrowId, mutation: Mutation) -> Result<EscrowTransaction> {
        (**self).compare_and_swap(id, mutation).await
    }

    async fn committed_mutation(
        &self,
        id: &EscrowId,
        audit_id: &AuditEntryId,
    ) -> Result<Option<EscrowTransaction>> {
        (**self).committed_mutation(id, audit_id).await
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        (**self).append_audit(entry).await
    }

    async fn audit_trail(&self, id: &EscrowId) -> Result<Vec<AuditEntry>> {
        (**self).audit_trail(id).await
    }

    async fn list(&self, filter: &EscrowFilter) -> Result<Vec<EscrowTransaction>> {
        (**self).list(filter).await
    }

    async fn pending_credits(&self, limit: usize) -> Result<Vec<QueuedCredit>> {
        (**self).pending_credits(limit).await
    }

    async fn credits_for(&self, id: &EscrowId) -> Result<Vec<QueuedCredit>> {
        (**self).credits_for(id).await
    }

    async fn mark_credit_delivered(&self, key: &IdempotencyKey) -> Result<()> {
        (**self).mark_credit_delivered(key).await
    }

    async fn record_credit_failure(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        (**self).record_credit_failure(key, error).await
    }

    async fn reject_credit(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        (**self).reject_credit(key, error).await
    }
}
