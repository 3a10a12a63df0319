// Scheduled background sweeps: overdue task escalation and ERP reference
// drift recovery. Jobs run on tokio-cron-scheduler at configured intervals.

pub mod escalation;
pub mod reference_sync;
pub mod scheduler;

pub use escalation::{EscalationSweepJob, EscalationSweepResult};
pub use reference_sync::{ReferenceSyncJob, ReferenceSyncResult};
pub use scheduler::{JobError, JobExecutionLog, JobResult, JobStatus, WorkflowScheduler};
