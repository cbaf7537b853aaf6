//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub database: ComponentStatus,
}

#[derive(Debug, Serialize)]
pub struct ComponentStatus {
    pub name: String,
    /// healthy, unhealthy or in_memory
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Liveness: the process answers. Dependencies are not checked.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().timestamp_millis(),
    })
}

/// Readiness: 503 while PostgreSQL is unreachable
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match &state.db {
        None => ComponentStatus {
            name: "ledger".to_string(),
            status: "in_memory".to_string(),
            error: None,
        },
        Some(db) if db.health_check().await.postgres => ComponentStatus {
            name: "PostgreSQL".to_string(),
            status: "healthy".to_string(),
            error: None,
        },
        Some(_) => ComponentStatus {
            name: "PostgreSQL".to_string(),
            status: "unhealthy".to_string(),
            error: Some("PostgreSQL health check failed".to_string()),
        },
    };

    let ready = database.status != "unhealthy";
    let (status_code, status) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        status_code,
        Json(ReadinessResponse {
            status: status.to_string(),
            database,
        }),
    )
}
