use axum::{
    Router,
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
};
use payflow_shared::{Role, RoleAssignment};
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::error::{WorkflowError, WorkflowResult};
use crate::services::NewRoleAssignment;

#[derive(Debug, Deserialize)]
pub struct HoldersQuery {
    pub branch_id: Uuid,
}

pub fn role_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/assignments", post(ingest_assignment))
        .route("/:role/holders", get(list_holders))
}

async fn ingest_assignment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewRoleAssignment>,
) -> WorkflowResult<Json<RoleAssignment>> {
    let assignment = state.roles.ingest(payload).await?;
    Ok(Json(assignment))
}

async fn list_holders(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Query(query): Query<HoldersQuery>,
) -> WorkflowResult<Json<Vec<RoleAssignment>>> {
    let role = Role::from_str(&role)
        .map_err(|e| WorkflowError::InvalidTarget(e.to_string()))?;
    let holders = state.roles.holders(role, query.branch_id).await?;
    Ok(Json(holders))
}
