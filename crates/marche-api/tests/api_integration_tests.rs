//! API integration tests
//!
//! Drive the router end to end over the in-memory ledger and wallet.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use marche_api::{create_router, create_test_router, ApiConfig, AppState};
use marche_ledger::InMemoryLedgerStore;
use marche_settlement::{EscrowConfig, SettlementService};
use marche_types::{AccountId, CurrencyCode, MinorUnits, UserId};
use marche_wallet::InMemoryWallet;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

struct TestApp {
    router: Router,
    wallet: InMemoryWallet,
}

fn app() -> TestApp {
    let wallet = InMemoryWallet::new();
    let service = SettlementService::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(wallet.clone()),
        EscrowConfig::default(),
    );
    let state = Arc::new(AppState::new(Arc::new(service)));
    TestApp {
        router: create_test_router(state),
        wallet,
    }
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    actor: Option<(UserId, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some((id, role)) = actor {
        request = request
            .header("x-actor-id", id.to_string())
            .header("x-actor-role", role);
    }
    let body = match body {
        Some(json_body) => Body::from(serde_json::to_vec(&json_body).unwrap()),
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap_or(json!(null));
    (status, json)
}

fn capture(customer: UserId, seller: UserId) -> Value {
    json!({
        "order_id": Uuid::new_v4(),
        "customer_id": customer,
        "seller_id": seller,
        "total_amount": 100_000,
        "currency": "XOF",
        "commission_rate": "0.15",
    })
}

async fn open_escrow(router: &Router, customer: UserId, seller: UserId) -> String {
    let (status, body) = call(
        router,
        "POST",
        "/api/v1/escrows",
        Some((UserId::new(), "system")),
        Some(capture(customer, seller)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = call(&app.router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_on_in_memory_store() {
    let wallet = InMemoryWallet::new();
    let service = SettlementService::new(
        Arc::new(InMemoryLedgerStore::new()),
        Arc::new(wallet),
        EscrowConfig::default(),
    );
    let router = create_router(
        Arc::new(AppState::new(Arc::new(service))),
        &ApiConfig::default(),
    );

    let response = router
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_create_returns_split_without_version() {
    let app = app();
    let (customer, seller) = (UserId::new(), UserId::new());
    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/escrows",
        Some((UserId::new(), "system")),
        Some(capture(customer, seller)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");
    assert_eq!(body["seller_amount"], 85_000);
    assert_eq!(body["commission_amount"], 15_000);
    assert!(body.get("version").is_none());
}

#[tokio::test]
async fn test_missing_actor_is_401() {
    let app = app();
    let (status, body) = call(
        &app.router,
        "POST",
        "/api/v1/escrows",
        None,
        Some(capture(UserId::new(), UserId::new())),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_release_flow_over_http() {
    let app = app();
    let (customer, seller) = (UserId::new(), UserId::new());
    let id = open_escrow(&app.router, customer, seller).await;

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/confirm-delivery"),
        Some((customer, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "delivered");

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/release"),
        Some((customer, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "released");

    let xof = CurrencyCode::new("XOF").unwrap();
    assert_eq!(
        app.wallet.balance(&AccountId::for_user(&seller), &xof).await,
        MinorUnits(85_000)
    );

    // A second release is refused and says why
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/release"),
        Some((customer, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "ILLEGAL_TRANSITION");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_dispute_flow_over_http() {
    let app = app();
    let (customer, seller) = (UserId::new(), UserId::new());
    let id = open_escrow(&app.router, customer, seller).await;

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/disputes"),
        Some((seller, "seller")),
        Some(json!({ "reason": "buyer claims non-delivery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "disputed");

    // The seller cannot rule on their own dispute
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/disputes/resolve"),
        Some((seller, "seller")),
        Some(json!({ "action": "release", "resolution_note": "mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let judge = UserId::new();
    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/disputes/resolve"),
        Some((judge, "adjudicator")),
        Some(json!({ "action": "refund" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "RESOLUTION_NOTE_REQUIRED");

    let (status, body) = call(
        &app.router,
        "POST",
        &format!("/api/v1/escrows/{id}/disputes/resolve"),
        Some((judge, "adjudicator")),
        Some(json!({ "action": "refund", "resolution_note": "tracking shows no delivery" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "refunded");
    assert_eq!(body["resolution"], "tracking shows no delivery");

    let (status, trail) = call(
        &app.router,
        "GET",
        &format!("/api/v1/escrows/{id}/audit"),
        Some((customer, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trail.as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_reads_are_scoped() {
    let app = app();
    let (customer, seller) = (UserId::new(), UserId::new());
    let id = open_escrow(&app.router, customer, seller).await;
    open_escrow(&app.router, UserId::new(), seller).await;

    let stranger = UserId::new();
    let (status, _) = call(
        &app.router,
        "GET",
        &format!("/api/v1/escrows/{id}"),
        Some((stranger, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = call(
        &app.router,
        "GET",
        "/api/v1/escrows?status=active",
        Some((customer, "customer")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/escrows?seller_id={}", seller.0),
        Some((UserId::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_escrow_is_404() {
    let app = app();
    let (status, body) = call(
        &app.router,
        "GET",
        &format!("/api/v1/escrows/{}", Uuid::new_v4()),
        Some((UserId::new(), "admin")),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_capture_is_400() {
    let app = app();
    let mut body = capture(UserId::new(), UserId::new());
    body["total_amount"] = json!(0);
    let (status, resp) = call(
        &app.router,
        "POST",
        "/api/v1/escrows",
        Some((UserId::new(), "system")),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "INVALID_AMOUNT");

    let mut body = capture(UserId::new(), UserId::new());
    body["commission_rate"] = json!("1.2");
    let (status, resp) = call(
        &app.router,
        "POST",
        "/api/v1/escrows",
        Some((UserId::new(), "system")),
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["code"], "INVALID_RATE");
}
