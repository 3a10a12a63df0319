use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use payflow_backend::jobs::WorkflowScheduler;
use payflow_backend::notifications::LogNotifier;
use payflow_backend::services::SyncService;
use payflow_backend::store::PgStore;
use payflow_backend::{AppState, build_router, config, database};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "payflow_backend=info,tower_http=info".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::create_pool(&config.database_url).await?;
    database::migrate(&db_pool).await?;

    let store: Arc<dyn payflow_backend::store::WorkflowStore> = Arc::new(PgStore::new(db_pool));
    let notifier: Arc<dyn payflow_backend::notifications::NotificationSink> = Arc::new(LogNotifier);

    let sync = Arc::new(SyncService::new(store.clone(), notifier.clone()));
    let scheduler = WorkflowScheduler::new(store.clone(), notifier.clone(), sync, config.jobs.clone())
        .await?;
    scheduler.start().await?;

    let app_state = Arc::new(AppState::new(store, notifier));
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
