//! In-memory ledger store
//!
//! Thread-safe and designed for concurrent access. A single lock guards
//! escrows, audit trail and outbox so every mutation is all-or-nothing.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use marche_types::{
    AuditEntry, AuditEntryId, CreditInstruction, CreditStatus, EscrowFilter, EscrowId,
    EscrowTransaction, IdempotencyKey, OrderId, QueuedCredit,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::{verify_mutation, LedgerError, LedgerStore, Mutation, Result};

#[derive(Default)]
struct LedgerState {
    escrows: HashMap<EscrowId, EscrowTransaction>,
    by_order: HashMap<OrderId, EscrowId>,
    /// Append-only
    audit: Vec<AuditEntry>,
    /// Outbox in insertion order
    credits: Vec<QueuedCredit>,
    credit_index: HashMap<IdempotencyKey, usize>,
}

impl LedgerState {
    fn enqueue(&mut self, instruction: CreditInstruction) {
        if self.credit_index.contains_key(&instruction.key) {
            return;
        }
        self.credit_index
            .insert(instruction.key.clone(), self.credits.len());
        self.credits.push(QueuedCredit::pending(instruction, Utc::now()));
    }

    fn credit_mut(&mut self, key: &IdempotencyKey) -> Result<&mut QueuedCredit> {
        let index = *self
            .credit_index
            .get(key)
            .ok_or_else(|| LedgerError::CreditNotFound {
                key: key.to_string(),
            })?;
        Ok(&mut self.credits[index])
    }
}

/// In-memory [`LedgerStore`] for tests and development
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    state: Arc<RwLock<LedgerState>>,
    latency: Option<Duration>,
    commit_latency: Option<Duration>,
}

impl InMemoryLedgerStore {
    /// Create a new in-memory ledger store
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before touching state
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    /// Delay compare-and-swap replies by `latency` after the mutation has
    /// been applied, like a commit acknowledgement stuck on the network
    pub fn with_commit_latency(mut self, latency: Duration) -> Self {
        self.commit_latency = Some(latency);
        self
    }

    /// Number of audit entries across all escrows
    pub async fn audit_len(&self) -> usize {
        self.state.read().await.audit.len()
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn not_found(id: &EscrowId) -> LedgerError {
    LedgerError::NotFound {
        escrow_id: id.to_string(),
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn create(&self, tx: EscrowTransaction, audit: AuditEntry) -> Result<EscrowId> {
        self.simulate_latency().await;
        tx.check_balanced().map_err(|e| LedgerError::Invariant {
            message: e.to_string(),
        })?;

        let mut state = self.state.write().await;
        if state.by_order.contains_key(&tx.order_id) {
            return Err(LedgerError::DuplicateOrder {
                order_id: tx.order_id.to_string(),
            });
        }

        let id = tx.id;
        state.by_order.insert(tx.order_id, id);
        state.escrows.insert(id, tx);
        state.audit.push(audit);
        Ok(id)
    }

    async fn get(&self, id: &EscrowId) -> Result<EscrowTransaction> {
        self.simulate_latency().await;
        self.state
            .read()
            .await
            .escrows
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<EscrowTransaction> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        state
            .by_order
            .get(order_id)
            .and_then(|id| state.escrows.get(id))
            .cloned()
            .ok_or_else(|| LedgerError::NotFound {
                escrow_id: format!("for {}", order_id),
            })
    }

    async fn compare_and_swap(&self, id: &EscrowId, mutation: Mutation) -> Result<EscrowTransaction> {
        self.simulate_latency().await;
        let next = {
            let mut state = self.state.write().await;

            let current = state.escrows.get(id).ok_or_else(|| not_found(id))?;
            if current.version != mutation.expected_version {
                return Err(LedgerError::VersionConflict {
                    escrow_id: id.to_string(),
                    expected: mutation.expected_version,
                    actual: current.version,
                });
            }

            let mut next = current.clone();
            (mutation.apply)(&mut next);
            verify_mutation(current, &next)?;
            next.version = current.version + 1;

            debug!(escrow_id = %id, version = next.version, status = %next.status, "Escrow mutated");

            state.escrows.insert(*id, next.clone());
            state.audit.push(mutation.audit);
            for credit in mutation.credits {
                state.enqueue(credit);
            }
            next
        };

        if let Some(latency) = self.commit_latency {
            tokio::time::sleep(latency).await;
        }
        Ok(next)
    }

    async fn committed_mutation(
        &self,
        id: &EscrowId,
        audit_id: &AuditEntryId,
    ) -> Result<Option<EscrowTransaction>> {
        // Mutations apply under the write lock, so none is half done here
        let state = self.state.read().await;
        let current = state.escrows.get(id).ok_or_else(|| not_found(id))?;
        if state.audit.iter().any(|entry| &entry.id == audit_id) {
            Ok(Some(current.clone()))
        } else {
            Ok(None)
        }
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.simulate_latency().await;
        self.state.write().await.audit.push(entry);
        Ok(())
    }

    async fn audit_trail(&self, id: &EscrowId) -> Result<Vec<AuditEntry>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        if !state.escrows.contains_key(id) {
            return Err(not_found(id));
        }
        Ok(state
            .audit
            .iter()
            .filter(|e| &e.escrow_id == id)
            .cloned()
            .collect())
    }

    async fn list(&self, filter: &EscrowFilter) -> Result<Vec<EscrowTransaction>> {
        self.simulate_latency().await;
        let state = self.state.read().await;
        let mut matches: Vec<EscrowTransaction> = state
            .escrows
            .values()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn pending_credits(&self, limit: usize) -> Result<Vec<QueuedCredit>> {
        self.simulate_latency().await;
        Ok(self
            .state
            .read()
            .await
            .credits
            .iter()
            .filter(|c| c.status == CreditStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn credits_for(&self, id: &EscrowId) -> Result<Vec<QueuedCredit>> {
        self.simulate_latency().await;
        Ok(self
            .state
            .read()
            .await
            .credits
            .iter()
            .filter(|c| &c.instruction.escrow_id == id)
            .cloned()
            .collect())
    }

    async fn mark_credit_delivered(&self, key: &IdempotencyKey) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        let credit = state.credit_mut(key)?;
        if credit.status == CreditStatus::Pending {
            credit.status = CreditStatus::Delivered;
            credit.attempts += 1;
            credit.last_error = None;
            credit.delivered_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn record_credit_failure(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        let credit = state.credit_mut(key)?;
        if credit.status == CreditStatus::Pending {
            credit.attempts += 1;
            credit.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn reject_credit(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut state = self.state.write().await;
        let credit = state.credit_mut(key)?;
        if credit.status == CreditStatus::Pending {
            credit.status = CreditStatus::Rejected;
            credit.attempts += 1;
            credit.last_error = Some(error.to_string());
        }
        Ok(())
    }
}
