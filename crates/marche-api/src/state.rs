//! Application state shared across handlers

use std::sync::Arc;

use marche_db::Database;
use marche_settlement::SettlementService;

#[derive(Clone)]
pub struct AppState {
    pub settlement: Arc<SettlementService>,
    /// Probed by the readiness check; absent when running on the in-memory store
    pub db: Option<Arc<Database>>,
}

impl AppState {
    pub fn new(settlement: Arc<SettlementService>) -> Self {
        Self {
            settlement,
            db: None,
        }
    }

    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.db = Some(db);
        self
    }
}
