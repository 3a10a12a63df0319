//! Periodic recovery sweep for ERP reference drift between documents and
//! their payment schedule entries.

use std::sync::Arc;

use crate::error::WorkflowResult;
use crate::services::SyncService;

pub struct ReferenceSyncJob {
    sync: Arc<SyncService>,
}

#[derive(Debug, Default)]
pub struct ReferenceSyncResult {
    pub documents_checked: i32,
    pub entries_updated: i32,
    pub errors: Vec<String>,
}

impl ReferenceSyncJob {
    pub fn new(sync: Arc<SyncService>) -> Self {
        Self { sync }
    }

    pub async fn run(&self) -> WorkflowResult<ReferenceSyncResult> {
        let report = self.sync.sync_all().await?;

        Ok(ReferenceSyncResult {
            documents_checked: report.documents_checked as i32,
            entries_updated: report.synced_count as i32,
            errors: report.errors,
        })
    }
}
