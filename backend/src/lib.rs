pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod notifications;
pub mod services;
pub mod store;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{ApiError, WorkflowError, WorkflowResult};

use crate::notifications::NotificationSink;
use crate::services::{
    DocumentService, PaymentService, RoleService, SyncService, TaskService, TemplateRegistry,
};
use crate::store::WorkflowStore;

pub struct AppState {
    pub documents: DocumentService,
    pub tasks: TaskService,
    pub payments: PaymentService,
    pub roles: RoleService,
    pub sync: Arc<SyncService>,
}

impl AppState {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        let templates = Arc::new(TemplateRegistry::standard());
        Self {
            documents: DocumentService::new(store.clone(), notifier.clone()),
            tasks: TaskService::new(store.clone(), notifier.clone(), templates),
            payments: PaymentService::new(store.clone(), notifier.clone()),
            roles: RoleService::new(store.clone()),
            sync: Arc::new(SyncService::new(store, notifier)),
        }
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Payflow Workflow API v1.0.0" }))
        .merge(handlers::health_routes())
        .nest("/api/v1/documents", handlers::document_routes())
        .nest("/api/v1/documents/:id/tasks", handlers::document_task_routes())
        .nest("/api/v1/documents/:id/payment", handlers::document_payment_routes())
        .nest("/api/v1/tasks", handlers::task_routes())
        .nest("/api/v1/payments", handlers::payment_routes())
        .nest("/api/v1/roles", handlers::role_routes())
        .nest("/api/v1/sync", handlers::sync_routes())
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(cors))
        .with_state(state)
}
