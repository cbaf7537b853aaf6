//! Audit log repository

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbAuditEntry, DbResult};

pub struct AuditRepo {
    pool: PgPool,
}

impl AuditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an entry inside an open transaction
    pub async fn insert(conn: &mut PgConnection, entry: &DbAuditEntry) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escrow_audit_log
                (id, escrow_id, actor_id, actor_role, action, from_status, to_status, outcome, reason, note, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.escrow_id)
        .bind(entry.actor_id)
        .bind(&entry.actor_role)
        .bind(&entry.action)
        .bind(&entry.from_status)
        .bind(&entry.to_status)
        .bind(&entry.outcome)
        .bind(&entry.reason)
        .bind(&entry.note)
        .bind(entry.recorded_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Append a standalone entry
    pub async fn append(&self, entry: &DbAuditEntry) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert(&mut *conn, entry).await
    }

    /// Whether an entry with this id has been committed
    pub async fn exists(conn: &mut PgConnection, id: Uuid) -> DbResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT seq FROM escrow_audit_log WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(found.is_some())
    }

    /// Entries for an escrow in append order
    pub async fn list_for_escrow(&self, escrow_id: Uuid) -> DbResult<Vec<DbAuditEntry>> {
        let entries = sqlx::query_as::<_, DbAuditEntry>(
            "SELECT * FROM escrow_audit_log WHERE escrow_id = $1 ORDER BY seq ASC",
        )
        .bind(escrow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entries)
    }
}
