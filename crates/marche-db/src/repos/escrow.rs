//! Escrow transaction repository

use marche_types::EscrowFilter;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{DbEscrow, DbResult};

pub struct EscrowRepo {
    pool: PgPool,
}

impl EscrowRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a new escrow inside an open transaction
    pub async fn insert(conn: &mut PgConnection, escrow: &DbEscrow) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO escrow_transactions
                (id, order_id, customer_id, seller_id, total_amount, seller_amount, commission_amount,
                 commission_rate, currency, status, dispute_reason, resolution, created_at,
                 delivery_confirmed_at, disputed_at, released_at, refunded_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        )
        .bind(escrow.id)
        .bind(escrow.order_id)
        .bind(escrow.customer_id)
        .bind(escrow.seller_id)
        .bind(escrow.total_amount)
        .bind(escrow.seller_amount)
        .bind(escrow.commission_amount)
        .bind(escrow.commission_rate)
        .bind(&escrow.currency)
        .bind(&escrow.status)
        .bind(&escrow.dispute_reason)
        .bind(&escrow.resolution)
        .bind(escrow.created_at)
        .bind(escrow.delivery_confirmed_at)
        .bind(escrow.disputed_at)
        .bind(escrow.released_at)
        .bind(escrow.refunded_at)
        .bind(escrow.updated_at)
        .bind(escrow.version)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// Read and row-lock an escrow inside an open transaction
    pub async fn lock(conn: &mut PgConnection, id: Uuid) -> DbResult<Option<DbEscrow>> {
        let escrow = sqlx::query_as::<_, DbEscrow>(
            "SELECT * FROM escrow_transactions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(escrow)
    }

    /// Write the mutable columns if the stored version is still `expected_version`.
    ///
    /// Returns false when the version moved on.
    pub async fn update_versioned(
        conn: &mut PgConnection,
        escrow: &DbEscrow,
        expected_version: i64,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE escrow_transactions
            SET status = $3, dispute_reason = $4, resolution = $5, delivery_confirmed_at = $6,
                disputed_at = $7, released_at = $8, refunded_at = $9, updated_at = $10, version = $11
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(escrow.id)
        .bind(expected_version)
        .bind(&escrow.status)
        .bind(&escrow.dispute_reason)
        .bind(&escrow.resolution)
        .bind(escrow.delivery_confirmed_at)
        .bind(escrow.disputed_at)
        .bind(escrow.released_at)
        .bind(escrow.refunded_at)
        .bind(escrow.updated_at)
        .bind(escrow.version)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn find_by_id(&self, id: Uuid) -> DbResult<Option<DbEscrow>> {
        let escrow = sqlx::query_as::<_, DbEscrow>("SELECT * FROM escrow_transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(escrow)
    }

    pub async fn find_by_order(&self, order_id: Uuid) -> DbResult<Option<DbEscrow>> {
        let escrow = sqlx::query_as::<_, DbEscrow>(
            "SELECT * FROM escrow_transactions WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(escrow)
    }

    /// Escrows matching `filter`, newest first
    pub async fn list(&self, filter: &EscrowFilter) -> DbResult<Vec<DbEscrow>> {
        let statuses: Vec<String> = filter
            .statuses
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();
        let limit = filter.limit.map(sql_limit);

        let escrows = sqlx::query_as::<_, DbEscrow>(
            r#"
            SELECT * FROM escrow_transactions
            WHERE ($1::uuid IS NULL OR customer_id = $1)
              AND ($2::uuid IS NULL OR seller_id = $2)
              AND (cardinality($3::text[]) = 0 OR status = ANY($3))
              AND ($4::timestamptz IS NULL OR delivery_confirmed_at < $4)
              AND ($5::timestamptz IS NULL OR disputed_at < $5)
            ORDER BY created_at DESC, id DESC
            LIMIT $6
            "#,
        )
        .bind(filter.customer_id.map(|id| id.0))
        .bind(filter.seller_id.map(|id| id.0))
        .bind(statuses)
        .bind(filter.delivered_before)
        .bind(filter.disputed_before)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(escrows)
    }
}

/// Saturate at `i64::MAX`; a wrapped negative LIMIT is a query error
fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_limit_saturates() {
        assert_eq!(sql_limit(50), 50);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }
}
