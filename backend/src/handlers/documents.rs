use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use payflow_shared::{ArtifactFlag, SourceDocument};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::error::WorkflowResult;
use crate::services::{CancellationSummary, NewDocument};

#[derive(Debug, Deserialize)]
pub struct SetArtifactRequest {
    pub flag: ArtifactFlag,
    pub value: bool,
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub user_id: Uuid,
}

pub fn document_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_document))
        .route("/:id", get(get_document))
        .route("/:id/artifacts", post(set_artifact))
        .route("/:id/cancel", post(cancel_document))
}

async fn create_document(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewDocument>,
) -> WorkflowResult<Json<SourceDocument>> {
    let doc = state.documents.create(payload).await?;
    Ok(Json(doc))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> WorkflowResult<Json<SourceDocument>> {
    let doc = state.documents.get(id).await?;
    Ok(Json(doc))
}

async fn set_artifact(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetArtifactRequest>,
) -> WorkflowResult<Json<SourceDocument>> {
    let doc = state
        .documents
        .set_artifact(id, payload.flag, payload.value, payload.user_id)
        .await?;
    Ok(Json(doc))
}

async fn cancel_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelRequest>,
) -> WorkflowResult<Json<CancellationSummary>> {
    let summary = state.documents.cancel(id, payload.user_id).await?;
    Ok(Json(summary))
}
