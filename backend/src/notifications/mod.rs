//! Workflow event fan-out.
//!
//! Services emit events after the state change has committed; delivery is
//! best-effort and never fails the operation that produced the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payflow_shared::{ApprovalStatus, ArtifactFlag, Criterion, Priority, Role};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    DocumentCreated {
        document_id: Uuid,
        branch_id: Uuid,
        vendor_id: Uuid,
    },
    ArtifactFlagSet {
        document_id: Uuid,
        flag: ArtifactFlag,
        value: bool,
        by_user: Uuid,
    },
    DocumentCancelled {
        document_id: Uuid,
        by_user: Uuid,
        tasks_cancelled: u64,
        entries_rejected: u64,
    },
    TaskCreated {
        task_id: Uuid,
        document_id: Uuid,
        role: Role,
        assigned_to: Option<Uuid>,
        /// Role holders beyond the primary assignee; informed, not owners.
        also_notified: Vec<Uuid>,
        deadline: DateTime<Utc>,
    },
    TaskStarted {
        task_id: Uuid,
        by_user: Uuid,
    },
    TaskCompleted {
        task_id: Uuid,
        document_id: Uuid,
        role: Role,
        by_user: Uuid,
        satisfied: Vec<Criterion>,
    },
    TaskReassigned {
        task_id: Uuid,
        from_user: Option<Uuid>,
        to_user: Uuid,
        by_user: Uuid,
        reason: String,
    },
    TaskEscalated {
        task_id: Uuid,
        document_id: Uuid,
        role: Role,
        /// Role whose holders receive the escalation notice.
        supervisor: Option<Role>,
        priority: Priority,
        deadline: DateTime<Utc>,
    },
    PaymentEntryCreated {
        entry_id: Uuid,
        document_id: Uuid,
        base_amount: Decimal,
    },
    ApprovalRequested {
        entry_id: Uuid,
        by_user: Uuid,
    },
    ApprovalDecided {
        entry_id: Uuid,
        by_user: Uuid,
        status: ApprovalStatus,
    },
    EntryReopened {
        entry_id: Uuid,
        by_user: Uuid,
    },
    DeductionsUpdated {
        entry_id: Uuid,
        by_user: Uuid,
        final_amount: Decimal,
    },
    ReferenceSynced {
        document_id: Uuid,
        entry_id: Uuid,
        reference: String,
    },
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, event: WorkflowEvent);
}

/// Default sink: structured log lines, one per event.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: WorkflowEvent) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(event = %json, "workflow event"),
            Err(e) => tracing::warn!("failed to serialize workflow event: {}", e),
        }
    }
}

/// Captures events in memory; used by tests to assert on emissions.
#[derive(Default)]
pub struct BufferNotifier {
    events: Arc<Mutex<Vec<WorkflowEvent>>>,
}

impl BufferNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<WorkflowEvent> {
        self.events.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl NotificationSink for BufferNotifier {
    async fn notify(&self, event: WorkflowEvent) {
        self.events.lock().await.push(event);
    }
}
