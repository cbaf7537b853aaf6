//! PostgreSQL-backed [`LedgerStore`]
//!
//! Every mutation runs in one database transaction: the escrow row is
//! locked, checked against the expected version, rewritten with a
//! version-guarded UPDATE, and the audit entry and credit rows are inserted
//! before commit. Dropping the transaction on any error rolls all of it back.

use async_trait::async_trait;
use chrono::Utc;
use marche_ledger::{verify_mutation, LedgerError, LedgerStore, Mutation, Result};
use marche_types::{
    AuditEntry, AuditEntryId, EscrowFilter, EscrowId, EscrowTransaction, IdempotencyKey, OrderId,
    QueuedCredit,
};
use sqlx::PgPool;
use tracing::debug;

use crate::{AuditRepo, CreditRepo, DbAuditEntry, DbCredit, DbError, DbEscrow, EscrowRepo};

pub struct PgLedgerStore {
    pool: PgPool,
    escrows: EscrowRepo,
    audit: AuditRepo,
    credits: CreditRepo,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            escrows: EscrowRepo::new(pool.clone()),
            audit: AuditRepo::new(pool.clone()),
            credits: CreditRepo::new(pool.clone()),
            pool,
        }
    }
}

fn not_found(id: &EscrowId) -> LedgerError {
    LedgerError::NotFound {
        escrow_id: id.to_string(),
    }
}

fn credit_not_found(key: &IdempotencyKey) -> LedgerError {
    LedgerError::CreditNotFound {
        key: key.to_string(),
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn create(&self, tx: EscrowTransaction, audit: AuditEntry) -> Result<EscrowId> {
        tx.check_balanced().map_err(|e| LedgerError::Invariant {
            message: e.to_string(),
        })?;
        let row = DbEscrow::try_from(&tx)?;

        let mut txn = self.pool.begin().await.map_err(DbError::from)?;
        if let Err(e) = EscrowRepo::insert(&mut *txn, &row).await {
            if e.is_unique_violation() {
                return Err(LedgerError::DuplicateOrder {
                    order_id: tx.order_id.to_string(),
                });
            }
            return Err(e.into());
        }
        AuditRepo::insert(&mut *txn, &DbAuditEntry::from(&audit)).await?;
        txn.commit().await.map_err(DbError::from)?;

        debug!(escrow_id = %tx.id, order_id = %tx.order_id, "Escrow row inserted");
        Ok(tx.id)
    }

    async fn get(&self, id: &EscrowId) -> Result<EscrowTransaction> {
        let row = self.escrows.find_by_id(id.0).await?.ok_or_else(|| not_found(id))?;
        Ok(EscrowTransaction::try_from(row)?)
    }

    async fn get_by_order(&self, order_id: &OrderId) -> Result<EscrowTransaction> {
        let row = self
            .escrows
            .find_by_order(order_id.0)
            .await?
            .ok_or_else(|| LedgerError::NotFound {
                escrow_id: format!("for {}", order_id),
            })?;
        Ok(EscrowTransaction::try_from(row)?)
    }

    async fn compare_and_swap(&self, id: &EscrowId, mutation: Mutation) -> Result<EscrowTransaction> {
        let mut txn = self.pool.begin().await.map_err(DbError::from)?;

        let row = EscrowRepo::lock(&mut *txn, id.0)
            .await?
            .ok_or_else(|| not_found(id))?;
        let current = EscrowTransaction::try_from(row)?;
        if current.version != mutation.expected_version {
            return Err(LedgerError::VersionConflict {
                escrow_id: id.to_string(),
                expected: mutation.expected_version,
                actual: current.version,
            });
        }

        let mut next = current.clone();
        (mutation.apply)(&mut next);
        verify_mutation(&current, &next)?;
        next.version = current.version + 1;

        let expected = DbEscrow::try_from(&current)?.version;
        if !EscrowRepo::update_versioned(&mut *txn, &DbEscrow::try_from(&next)?, expected).await? {
            return Err(LedgerError::VersionConflict {
                escrow_id: id.to_string(),
                expected: mutation.expected_version,
                actual: current.version,
            });
        }

        AuditRepo::insert(&mut *txn, &DbAuditEntry::from(&mutation.audit)).await?;
        let now = Utc::now();
        for credit in &mutation.credits {
            CreditRepo::insert(&mut *txn, &DbCredit::pending(credit, now)).await?;
        }
        txn.commit().await.map_err(DbError::from)?;

        debug!(escrow_id = %id, version = next.version, status = %next.status, "Escrow row updated");
        Ok(next)
    }

    async fn committed_mutation(
        &self,
        id: &EscrowId,
        audit_id: &AuditEntryId,
    ) -> Result<Option<EscrowTransaction>> {
        let mut txn = self.pool.begin().await.map_err(DbError::from)?;

        // Blocks until a swap still holding the row lock commits or rolls back
        let row = EscrowRepo::lock(&mut *txn, id.0)
            .await?
            .ok_or_else(|| not_found(id))?;
        let committed = AuditRepo::exists(&mut *txn, audit_id.0).await?;
        txn.rollback().await.map_err(DbError::from)?;

        if committed {
            Ok(Some(EscrowTransaction::try_from(row)?))
        } else {
            Ok(None)
        }
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<()> {
        self.audit.append(&DbAuditEntry::from(&entry)).await?;
        Ok(())
    }

    async fn audit_trail(&self, id: &EscrowId) -> Result<Vec<AuditEntry>> {
        if self.escrows.find_by_id(id.0).await?.is_none() {
            return Err(not_found(id));
        }
        let rows = self.audit.list_for_escrow(id.0).await?;
        rows.into_iter()
            .map(|row| AuditEntry::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    async fn list(&self, filter: &EscrowFilter) -> Result<Vec<EscrowTransaction>> {
        let rows = self.escrows.list(filter).await?;
        rows.into_iter()
            .map(|row| EscrowTransaction::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    async fn pending_credits(&self, limit: usize) -> Result<Vec<QueuedCredit>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self.credits.list_pending(limit).await?;
        rows.into_iter()
            .map(|row| QueuedCredit::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    async fn credits_for(&self, id: &EscrowId) -> Result<Vec<QueuedCredit>> {
        let rows = self.credits.list_for_escrow(id.0).await?;
        rows.into_iter()
            .map(|row| QueuedCredit::try_from(row).map_err(LedgerError::from))
            .collect()
    }

    async fn mark_credit_delivered(&self, key: &IdempotencyKey) -> Result<()> {
        if self.credits.mark_delivered(key.as_str()).await? {
            Ok(())
        } else {
            Err(credit_not_found(key))
        }
    }

    async fn record_credit_failure(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        if self.credits.record_failure(key.as_str(), error).await? {
            Ok(())
        } else {
            Err(credit_not_found(key))
        }
    }

    async fn reject_credit(&self, key: &IdempotencyKey, error: &str) -> Result<()> {
        if self.credits.mark_rejected(key.as_str(), error).await? {
            Ok(())
        } else {
            Err(credit_not_found(key))
        }
    }
}
