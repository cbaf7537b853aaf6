//! API routes

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::handlers::escrow;
use crate::state::AppState;

/// Create API v1 routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/escrows", post(escrow::create_escrow).get(escrow::list_escrows))
        .route("/escrows/:id", get(escrow::get_escrow))
        .route("/escrows/:id/audit", get(escrow::get_audit_trail))
        .route("/escrows/:id/confirm-delivery", post(escrow::confirm_delivery))
        .route("/escrows/:id/release", post(escrow::release))
        .route("/escrows/:id/disputes", post(escrow::open_dispute))
        .route("/escrows/:id/disputes/resolve", post(escrow::resolve_dispute))
}
