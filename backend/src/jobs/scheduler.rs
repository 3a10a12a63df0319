//! Central scheduler for the workflow background sweeps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::{EscalationSweepJob, ReferenceSyncJob};
use crate::config::JobConfig;
use crate::notifications::NotificationSink;
use crate::services::SyncService;
use crate::store::WorkflowStore;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] JobSchedulerError),
    #[error("Job execution error: {0}")]
    Execution(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

const MAX_EXECUTION_LOGS: usize = 100;

pub struct WorkflowScheduler {
    scheduler: TokioScheduler,
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
    sync: Arc<SyncService>,
    config: JobConfig,
    execution_logs: Arc<RwLock<Vec<JobExecutionLog>>>,
}

impl WorkflowScheduler {
    pub async fn new(
        store: Arc<dyn WorkflowStore>,
        notifier: Arc<dyn NotificationSink>,
        sync: Arc<SyncService>,
        config: JobConfig,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            store,
            notifier,
            sync,
            config,
            execution_logs: Arc::new(RwLock::new(Vec::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting workflow job scheduler");

        self.schedule_escalation_sweep().await?;
        self.schedule_reference_sync().await?;
        self.scheduler.start().await?;

        info!("Workflow job scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down workflow job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_escalation_sweep(&self) -> JobResult<()> {
        if !self.config.escalation_enabled {
            info!("Escalation sweep is disabled, skipping");
            return Ok(());
        }

        let interval = self.config.escalation_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval);

        let store = self.store.clone();
        let notifier = self.notifier.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            let notifier = notifier.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running escalation sweep");

                let sweep = EscalationSweepJob::new(store, notifier);
                match sweep.run().await {
                    Ok(result) => {
                        info!(
                            "Escalation sweep completed: {} tasks checked, {} escalated",
                            result.tasks_checked, result.escalations
                        );
                        record_execution(
                            &logs,
                            "Escalation Sweep",
                            started_at,
                            result.tasks_checked,
                            result.errors,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Escalation sweep failed: {}", e);
                        record_execution(
                            &logs,
                            "Escalation Sweep",
                            started_at,
                            0,
                            vec![e.to_string()],
                        )
                        .await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled escalation sweep every {} minutes", interval);
        Ok(())
    }

    async fn schedule_reference_sync(&self) -> JobResult<()> {
        let interval = self.config.reference_sync_interval_hours;
        let cron_expr = format!("0 0 */{} * * *", interval);

        let sync = self.sync.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let sync = sync.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                info!("Running reference sync sweep");

                let job = ReferenceSyncJob::new(sync);
                match job.run().await {
                    Ok(result) => {
                        info!(
                            "Reference sync completed: {} documents checked, {} entries updated",
                            result.documents_checked, result.entries_updated
                        );
                        record_execution(
                            &logs,
                            "Reference Sync",
                            started_at,
                            result.documents_checked,
                            result.errors,
                        )
                        .await;
                    }
                    Err(e) => {
                        error!("Reference sync failed: {}", e);
                        record_execution(&logs, "Reference Sync", started_at, 0, vec![e.to_string()])
                            .await;
                    }
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled reference sync every {} hours", interval);
        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.clone()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<()> {
        match job_name {
            "escalation_sweep" => {
                let sweep = EscalationSweepJob::new(self.store.clone(), self.notifier.clone());
                sweep
                    .run()
                    .await
                    .map_err(|e| JobError::Execution(e.to_string()))?;
            }
            "reference_sync" => {
                let job = ReferenceSyncJob::new(self.sync.clone());
                job.run()
                    .await
                    .map_err(|e| JobError::Execution(e.to_string()))?;
            }
            _ => return Err(JobError::Config(format!("Unknown job: {}", job_name))),
        }
        Ok(())
    }
}

async fn record_execution(
    logs: &Arc<RwLock<Vec<JobExecutionLog>>>,
    job_name: &str,
    started_at: DateTime<Utc>,
    items_processed: i32,
    errors: Vec<String>,
) {
    let completed_at = Utc::now();
    let status = if errors.is_empty() {
        JobStatus::Completed
    } else if items_processed > 0 {
        JobStatus::PartialFailure
    } else {
        JobStatus::Failed
    };

    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: job_name.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status,
        items_processed,
        errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    };

    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}
