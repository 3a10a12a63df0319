use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::post,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::error::WorkflowResult;
use crate::services::{BulkSyncReport, SyncOutcome};

pub fn sync_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/run", post(run_bulk_sync))
        .route("/documents/:id", post(sync_document))
}

async fn sync_document(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> WorkflowResult<Json<SyncOutcome>> {
    let outcome = state.sync.sync_document(id).await?;
    Ok(Json(outcome))
}

async fn run_bulk_sync(
    State(state): State<Arc<AppState>>,
) -> WorkflowResult<Json<BulkSyncReport>> {
    let report = state.sync.sync_all().await?;
    Ok(Json(report))
}
