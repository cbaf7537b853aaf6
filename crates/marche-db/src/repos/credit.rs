//! Wallet credit outbox repository

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbCredit, DbResult};

pub struct CreditRepo {
    pool: PgPool,
}

impl CreditRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Queue a credit inside an open transaction. An existing key is kept as is.
    pub async fn insert(conn: &mut PgConnection, credit: &DbCredit) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_credits
                (idempotency_key, escrow_id, leg, account_id, amount, currency, status, attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (idempotency_key) DO NOTHING
            "#,
        )
        .bind(&credit.idempotency_key)
        .bind(credit.escrow_id)
        .bind(&credit.leg)
        .bind(&credit.account_id)
        .bind(credit.amount)
        .bind(&credit.currency)
        .bind(&credit.status)
        .bind(credit.attempts)
        .bind(credit.created_at)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    pub async fn find_by_key(&self, key: &str) -> DbResult<Option<DbCredit>> {
        let credit = sqlx::query_as::<_, DbCredit>(
            "SELECT * FROM wallet_credits WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credit)
    }

    /// Pending credits, oldest first
    pub async fn list_pending(&self, limit: i64) -> DbResult<Vec<DbCredit>> {
        let credits = sqlx::query_as::<_, DbCredit>(
            "SELECT * FROM wallet_credits WHERE status = 'pending' ORDER BY seq ASC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(credits)
    }

    pub async fn list_for_escrow(&self, escrow_id: Uuid) -> DbResult<Vec<DbCredit>> {
        let credits = sqlx::query_as::<_, DbCredit>(
            "SELECT * FROM wallet_credits WHERE escrow_id = $1 ORDER BY seq ASC",
        )
        .bind(escrow_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(credits)
    }

    /// Returns false when no row has this key
    pub async fn mark_delivered(&self, key: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_credits
            SET status = 'delivered', attempts = attempts + 1, last_error = NULL, delivered_at = NOW()
            WHERE idempotency_key = $1 AND status = 'pending'
            "#,
        )
        .bind(key)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Ok(self.find_by_key(key).await?.is_some())
    }

    /// Returns false when no row has this key
    pub async fn record_failure(&self, key: &str, error: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_credits
            SET attempts = attempts + 1, last_error = $2
            WHERE idempotency_key = $1 AND status = 'pending'
            "#,
        )
        .bind(key)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Ok(self.find_by_key(key).await?.is_some())
    }

    /// Park a refused credit as `rejected`. Returns false when no row has this key
    pub async fn mark_rejected(&self, key: &str, error: &str) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE wallet_credits
            SET status = 'rejected', attempts = attempts + 1, last_error = $2
            WHERE idempotency_key = $1 AND status = 'pending'
            "#,
        )
        .bind(key)
        .bind(error)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }
        Ok(self.find_by_key(key).await?.is_some())
    }
}
