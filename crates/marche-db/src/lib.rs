//! Marche Database Layer
//!
//! PostgreSQL persistence for the escrow ledger.
//!
//! # Tables
//!
//! - `escrow_transactions`: one row per escrow, unique per order, guarded by a `version` column
//! - `escrow_audit_log`: append-only trail of every transition attempt
//! - `wallet_credits`: outbox of credits owed to the wallet service
//!
//! # Repository Pattern
//!
//! Each table has its own repository. [`PgLedgerStore`] composes them into
//! a transactional [`marche_ledger::LedgerStore`].

pub mod config;
pub mod error;
pub mod models;
pub mod repos;
mod store;

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

pub use config::DatabaseConfig;
pub use error::{DbError, DbResult};
pub use models::*;
pub use repos::*;
pub use store::PgLedgerStore;

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pub pg: PgPool,
}

impl Database {
    /// Connect to PostgreSQL
    pub async fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        info!("Connecting to PostgreSQL: {}", config.url_masked());

        let pg = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| DbError::Connection(format!("PostgreSQL: {}", e)))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pg })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> DbResult<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pg)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    pub async fn health_check(&self) -> HealthStatus {
        let postgres = sqlx::query("SELECT 1").fetch_one(&self.pg).await.is_ok();
        HealthStatus { postgres }
    }

    pub fn escrow_repo(&self) -> EscrowRepo {
        EscrowRepo::new(self.pg.clone())
    }

    pub fn audit_repo(&self) -> AuditRepo {
        AuditRepo::new(self.pg.clone())
    }

    pub fn credit_repo(&self) -> CreditRepo {
        CreditRepo::new(self.pg.clone())
    }

    /// Ledger store over this pool
    pub fn ledger_store(&self) -> PgLedgerStore {
        PgLedgerStore::new(self.pg.clone())
    }
}

/// Health status of the database connection
#[derive(Debug, Clone, Copy)]
pub struct HealthStatus {
    pub postgres: bool,
}
