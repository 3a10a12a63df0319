//! Overdue task escalation sweep.
//!
//! Finds open or in-progress tasks past their deadline that have not been
//! escalated yet, raises their priority one level and notifies the
//! supervising role. A task is escalated at most once; ownership never
//! changes here.

use chrono::Utc;
use std::sync::Arc;

use crate::notifications::{NotificationSink, WorkflowEvent};
use crate::store::{StoreError, WorkflowStore};

pub struct EscalationSweepJob {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
}

#[derive(Debug, Default)]
pub struct EscalationSweepResult {
    pub tasks_checked: i32,
    pub escalations: i32,
    pub errors: Vec<String>,
}

impl EscalationSweepJob {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn run(&self) -> Result<EscalationSweepResult, StoreError> {
        let mut result = EscalationSweepResult::default();
        let now = Utc::now();

        let overdue = self.store.overdue_unescalated_tasks(now).await?;
        result.tasks_checked = overdue.len() as i32;

        for task in overdue {
            let raised = task.priority.raised();
            match self.store.mark_task_escalated(task.id, raised, now).await {
                // Another sweep or a completion got there first.
                Ok(false) => continue,
                Ok(true) => {
                    result.escalations += 1;
                    tracing::info!(
                        task_id = %task.id,
                        role = %task.role,
                        priority = %raised,
                        "task escalated"
                    );
                    self.notifier
                        .notify(WorkflowEvent::TaskEscalated {
                            task_id: task.id,
                            document_id: task.document_id,
                            role: task.role,
                            supervisor: task.role.supervisor(),
                            priority: raised,
                            deadline: task.deadline,
                        })
                        .await;
                }
                Err(e) => {
                    result
                        .errors
                        .push(format!("failed to escalate task {}: {}", task.id, e));
                }
            }
        }

        Ok(result)
    }
}
