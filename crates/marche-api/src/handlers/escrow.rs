//! Escrow handlers
//!
//! Thin adapters: parse, call the settlement service, serialize. Every
//! business rule lives behind [`marche_settlement::SettlementService`].

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use marche_types::{AuditEntry, EscrowId, EscrowView, PaymentCaptured};
use std::sync::Arc;
use uuid::Uuid;

use crate::dto::{CreateEscrowRequest, ListEscrowsQuery, OpenDisputeRequest, ResolveDisputeRequest};
use crate::error::ApiResult;
use crate::extractors::{RequestActor, ValidatedJson};
use crate::state::AppState;

/// Open an escrow for a captured payment
pub async fn create_escrow(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    ValidatedJson(req): ValidatedJson<CreateEscrowRequest>,
) -> ApiResult<(StatusCode, Json<EscrowView>)> {
    let captured = PaymentCaptured::try_from(req)?;
    let escrow = state.settlement.create(captured, actor).await?;
    Ok((StatusCode::CREATED, Json(escrow)))
}

pub async fn get_escrow(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EscrowView>> {
    let escrow = state.settlement.get(&EscrowId::from_uuid(id), actor).await?;
    Ok(Json(escrow))
}

pub async fn get_audit_trail(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<AuditEntry>>> {
    let trail = state
        .settlement
        .audit_trail(&EscrowId::from_uuid(id), actor)
        .await?;
    Ok(Json(trail))
}

/// List escrows; customers and sellers only ever see their own
pub async fn list_escrows(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Query(query): Query<ListEscrowsQuery>,
) -> ApiResult<Json<Vec<EscrowView>>> {
    let escrows = state.settlement.list(query.into(), actor).await?;
    Ok(Json(escrows))
}

pub async fn confirm_delivery(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EscrowView>> {
    let escrow = state
        .settlement
        .confirm_delivery(&EscrowId::from_uuid(id), actor)
        .await?;
    Ok(Json(escrow))
}

pub async fn release(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EscrowView>> {
    let escrow = state
        .settlement
        .release(&EscrowId::from_uuid(id), actor)
        .await?;
    Ok(Json(escrow))
}

pub async fn open_dispute(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<OpenDisputeRequest>,
) -> ApiResult<Json<EscrowView>> {
    let escrow = state
        .settlement
        .open_dispute(&EscrowId::from_uuid(id), actor, &req.reason)
        .await?;
    Ok(Json(escrow))
}

pub async fn resolve_dispute(
    State(state): State<Arc<AppState>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<Uuid>,
    ValidatedJson(req): ValidatedJson<ResolveDisputeRequest>,
) -> ApiResult<Json<EscrowView>> {
    let escrow = state
        .settlement
        .resolve_dispute(&EscrowId::from_uuid(id), actor, req.action, &req.resolution_note)
        .await?;
    Ok(Json(escrow))
}
