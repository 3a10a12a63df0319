use axum::{
    Router,
    extract::{Path, State},
    response::Json,
    routing::{get, post},
};
use payflow_shared::{CompletionEvidence, Task};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::error::WorkflowResult;
use crate::services::{CompletionOutcome, DependencyStatus, TaskView};

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct CompleteRequest {
    pub user_id: Uuid,
    #[serde(flatten)]
    pub evidence: CompletionEvidence,
}

#[derive(Debug, Deserialize)]
pub struct ReassignRequest {
    pub by_user: Uuid,
    pub to_user: Uuid,
    pub reason: String,
}

pub fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/:id", get(get_task))
        .route("/:id/dependencies", get(check_dependencies))
        .route("/:id/start", post(start_task))
        .route("/:id/complete", post(complete_task))
        .route("/:id/reassign", post(reassign_task))
}

/// Document-scoped task routes, nested under /documents/:id/tasks.
pub fn document_task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_document_tasks))
        .route("/generate", post(generate_tasks))
}

async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> WorkflowResult<Json<Task>> {
    let task = state.tasks.get(id).await?;
    Ok(Json(task))
}

async fn check_dependencies(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> WorkflowResult<Json<Vec<DependencyStatus>>> {
    let statuses = state.tasks.check_dependencies(id).await?;
    Ok(Json(statuses))
}

async fn generate_tasks(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> WorkflowResult<Json<Vec<Task>>> {
    let tasks = state.tasks.generate_for_document(document_id).await?;
    Ok(Json(tasks))
}

async fn list_document_tasks(
    State(state): State<Arc<AppState>>,
    Path(document_id): Path<Uuid>,
) -> WorkflowResult<Json<Vec<TaskView>>> {
    let views = state.tasks.views_for_document(document_id).await?;
    Ok(Json(views))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartRequest>,
) -> WorkflowResult<Json<Task>> {
    let task = state.tasks.start(id, payload.user_id).await?;
    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CompleteRequest>,
) -> WorkflowResult<Json<CompletionOutcome>> {
    let outcome = state
        .tasks
        .complete(id, payload.user_id, payload.evidence)
        .await?;
    Ok(Json(outcome))
}

async fn reassign_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReassignRequest>,
) -> WorkflowResult<Json<Task>> {
    let task = state
        .tasks
        .reassign(id, payload.by_user, payload.to_user, payload.reason)
        .await?;
    Ok(Json(task))
}
