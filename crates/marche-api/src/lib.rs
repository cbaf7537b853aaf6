//! Marche REST API
//!
//! HTTP surface of the escrow settlement engine.
//!
//! # API Structure
//!
//! ```text
//! /api/v1/escrows
//! ├── POST /                           - open an escrow (capture event)
//! ├── GET  /?customer_id|seller_id|status
//! ├── GET  /:id
//! ├── GET  /:id/audit
//! ├── POST /:id/confirm-delivery
//! ├── POST /:id/release
//! ├── POST /:id/disputes               - { reason }
//! └── POST /:id/disputes/resolve       - { action, resolution_note }
//! /health, /ready
//! ```
//!
//! The acting identity arrives in `x-actor-id` / `x-actor-role`, set by
//! the gateway after authentication.

pub mod dto;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::http::HeaderName;
use axum::Router;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult, ErrorResponse};
pub use state::AppState;

/// API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
    pub enable_tracing: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_origins: vec!["*".to_string()],
            enable_tracing: true,
        }
    }
}

/// Create the main API router with all middleware
pub fn create_router(state: Arc<AppState>, config: &ApiConfig) -> Router {
    let mut router = base_routes()
        .route("/ready", axum::routing::get(handlers::health::readiness_check))
        .with_state(state);

    if config.enable_tracing {
        router = router.layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");

                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            },
        ));
    }

    // Outermost, so the trace span sees the id
    let x_request_id = HeaderName::from_static("x-request-id");
    router = router
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid));

    if config.enable_cors {
        let cors = if config.cors_origins.iter().any(|o| o == "*") {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(
                    config
                        .cors_origins
                        .iter()
                        .filter_map(|o| o.parse().ok())
                        .collect::<Vec<_>>(),
                )
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(Any)
        };
        router = router.layer(cors);
    }

    router
}

/// Create a minimal router for testing
pub fn create_test_router(state: Arc<AppState>) -> Router {
    base_routes().with_state(state)
}

fn base_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api/v1", routes::api_v1_routes())
        .route("/health", axum::routing::get(handlers::health::health_check))
}
