use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use payflow_shared::{Deductions, PaymentScheduleEntry};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::error::WorkflowResult;

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    pub user_id: Uuid,
    pub approve: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeductionsRequest {
    pub user_id: Uuid,
    pub shortage: Decimal,
    pub damage: Decimal,
    pub adjustment: Decimal,
    pub final_amount: Decimal,
}

pub fn payment_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(get_entry))
        .route("/:id/request", post(request_approval))
        .route("/:id/decide", post(decide))
        .route("/:id/reopen", post(reopen))
        .route("/:id/deductions", post(update_deductions))
}

/// Nested under /documents/:id/payment.
pub fn document_payment_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(get_entry_for_document))
}

async fn get_entry(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let entry = state.payments.get(id).await?;
    Ok(Json(entry))
}

async fn get_entry_for_document(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let entry = state.payments.for_document(document_id).await?;
    Ok(Json(entry))
}

async fn request_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let entry = state.payments.request_approval(id, payload.user_id).await?;
    Ok(Json(entry))
}

async fn decide(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecideRequest>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let entry = state
        .payments
        .decide(id, payload.user_id, payload.approve, payload.notes)
        .await?;
    Ok(Json(entry))
}

async fn reopen(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorRequest>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let entry = state.payments.reopen(id, payload.user_id).await?;
    Ok(Json(entry))
}

async fn update_deductions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DeductionsRequest>,
) -> WorkflowResult<Json<PaymentScheduleEntry>> {
    let deductions = Deductions {
        shortage: payload.shortage,
        damage: payload.damage,
        adjustment: payload.adjustment,
    };
    let entry = state
        .payments
        .update_deductions(id, payload.user_id, deductions, payload.final_amount)
        .await?;
    Ok(Json(entry))
}
