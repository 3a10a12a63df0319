use axum::{Router, extract::State, response::Json, routing::get};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod documents;
pub mod payments;
pub mod roles;
pub mod sync;
pub mod tasks;

pub use documents::document_routes;
pub use payments::{document_payment_routes, payment_routes};
pub use roles::role_routes;
pub use sync::sync_routes;
pub use tasks::{document_task_routes, task_routes};

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

async fn health(State(_state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "payflow-backend",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
