//! In-memory store used by the test suite and for local development
//! without Postgres. A single mutex guards all state, so every trait
//! method is trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payflow_shared::{
    ApprovalStatus, ArtifactFlag, Deductions, PaymentScheduleEntry, Priority, ReassignmentRecord,
    Role, RoleAssignment, SourceDocument, Task, TaskCompletion, TaskStatus,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ApprovalTransition, CompletionGates, CompletionWrite, StoreError, TerminalCompletion,
    WorkflowStore,
};

#[derive(Default)]
struct Inner {
    documents: HashMap<Uuid, SourceDocument>,
    tasks: HashMap<Uuid, Task>,
    // keyed by task id; written exactly once per task
    completions: HashMap<Uuid, TaskCompletion>,
    entries: HashMap<Uuid, PaymentScheduleEntry>,
    assignments: Vec<RoleAssignment>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for MemoryStore {
    async fn insert_document(&self, doc: &SourceDocument) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<SourceDocument>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.documents.get(&id).cloned())
    }

    async fn set_artifact_flag(
        &self,
        id: Uuid,
        flag: ArtifactFlag,
        value: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.documents.get_mut(&id) {
            Some(doc) => {
                doc.artifacts.set(flag, value);
                doc.updated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_document_reference(
        &self,
        id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.documents.get_mut(&id) {
            Some(doc) => {
                doc.external_reference = Some(reference.to_string());
                doc.updated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_document_cancelled(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.documents.get_mut(&id) {
            Some(doc) if doc.cancelled_at.is_none() => {
                doc.cancelled_at = Some(at);
                doc.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn documents_with_reference_drift(&self) -> Result<Vec<SourceDocument>, StoreError> {
        let inner = self.inner.lock().await;
        let mut drifted: Vec<SourceDocument> = inner
            .documents
            .values()
            .filter(|doc| !doc.is_cancelled() && doc.external_reference.is_some())
            .filter(|doc| {
                inner
                    .entries
                    .values()
                    .find(|e| e.document_id == doc.id)
                    .is_some_and(|e| e.external_reference != doc.external_reference)
            })
            .cloned()
            .collect();
        drifted.sort_by_key(|d| d.created_at);
        Ok(drifted)
    }

    async fn task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.get(&id).cloned())
    }

    async fn tasks_for_document(&self, document_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.document_id == document_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(tasks)
    }

    async fn insert_task_if_absent(&self, task: &Task) -> Result<Option<Task>, StoreError> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .tasks
            .values()
            .find(|t| {
                t.document_id == task.document_id
                    && t.role == task.role
                    && t.status != TaskStatus::Cancelled
            })
            .cloned();
        match existing {
            Some(found) => Ok(Some(found)),
            None => {
                inner.tasks.insert(task.id, task.clone());
                Ok(None)
            }
        }
    }

    async fn set_task_status(
        &self,
        task_id: Uuid,
        expected: &[TaskStatus],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tasks.get_mut(&task_id) {
            Some(task) if expected.contains(&task.status) => {
                task.status = status;
                task.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_completion(
        &self,
        completion: &TaskCompletion,
        expected: &[TaskStatus],
        gates: &CompletionGates,
        terminal: Option<&TerminalCompletion>,
    ) -> Result<CompletionWrite, StoreError> {
        let mut inner = self.inner.lock().await;

        if !gates.is_empty() {
            let Some(doc) = inner.documents.get(&gates.document_id) else {
                return Ok(CompletionWrite::GatesFailed);
            };
            if gates.artifacts.iter().any(|f| !doc.artifacts.get(*f)) {
                return Ok(CompletionWrite::GatesFailed);
            }
            for role in &gates.predecessors {
                let done = inner.tasks.values().any(|t| {
                    t.document_id == gates.document_id
                        && t.role == *role
                        && t.status == TaskStatus::Completed
                });
                if !done {
                    return Ok(CompletionWrite::GatesFailed);
                }
            }
        }

        let transitioned = match inner.tasks.get_mut(&completion.task_id) {
            Some(task) if expected.contains(&task.status) => {
                task.status = TaskStatus::Completed;
                task.updated_at = Some(completion.completed_at);
                true
            }
            _ => false,
        };
        if !transitioned {
            return Ok(CompletionWrite::StatusConflict);
        }
        inner.completions.insert(completion.task_id, completion.clone());
        if let Some(terminal) = terminal {
            let document_id = terminal.entry.document_id;
            if let Some(reference) = &terminal.reference {
                if let Some(doc) = inner.documents.get_mut(&document_id) {
                    doc.external_reference = Some(reference.clone());
                    doc.updated_at = Some(completion.completed_at);
                }
            }
            let existing_id = inner
                .entries
                .values()
                .find(|e| e.document_id == document_id)
                .map(|e| e.id);
            match existing_id {
                Some(entry_id) => {
                    if let Some(reference) = &terminal.reference {
                        let entry = inner.entries.get_mut(&entry_id);
                        if let Some(entry) = entry {
                            if entry.external_reference.as_deref() != Some(reference.as_str()) {
                                entry.external_reference = Some(reference.clone());
                                entry.updated_at = Some(completion.completed_at);
                            }
                        }
                    }
                }
                None => {
                    inner.entries.insert(terminal.entry.id, terminal.entry.clone());
                }
            }
        }
        Ok(CompletionWrite::Applied)
    }

    async fn completion_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskCompletion>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.completions.get(&task_id).cloned())
    }

    async fn record_reassignment(
        &self,
        task_id: Uuid,
        record: &ReassignmentRecord,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tasks.get_mut(&task_id) {
            Some(task) if !task.status.is_final() => {
                task.reassignments.push(record.clone());
                task.assigned_to = Some(record.to_user);
                task.updated_at = Some(record.at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_task_escalated(
        &self,
        task_id: Uuid,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.tasks.get_mut(&task_id) {
            Some(task) if !task.status.is_final() && task.escalated_at.is_none() => {
                task.priority = priority;
                task.escalated_at = Some(at);
                task.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel_open_tasks(
        &self,
        document_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut cancelled = 0;
        for task in inner.tasks.values_mut() {
            if task.document_id == document_id && !task.status.is_final() {
                task.status = TaskStatus::Cancelled;
                task.updated_at = Some(at);
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }

    async fn overdue_unescalated_tasks(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let inner = self.inner.lock().await;
        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.is_overdue(as_of) && t.escalated_at.is_none())
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.deadline);
        Ok(tasks)
    }

    async fn payment_entry(&self, id: Uuid) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.entries.get(&id).cloned())
    }

    async fn payment_entry_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .entries
            .values()
            .find(|e| e.document_id == document_id)
            .cloned())
    }

    async fn insert_entry_if_absent(
        &self,
        entry: &PaymentScheduleEntry,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .entries
            .values()
            .find(|e| e.document_id == entry.document_id)
            .cloned();
        match existing {
            Some(found) => Ok(Some(found)),
            None => {
                inner.entries.insert(entry.id, entry.clone());
                Ok(None)
            }
        }
    }

    async fn apply_approval_transition(
        &self,
        entry_id: Uuid,
        expected: ApprovalStatus,
        transition: &ApprovalTransition,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&entry_id) {
            Some(entry) if entry.approval_status == expected => {
                match transition {
                    ApprovalTransition::Requested { requester, at } => {
                        entry.approval_status = ApprovalStatus::Requested;
                        entry.requested_by = Some(*requester);
                        entry.requested_at = Some(*at);
                        entry.updated_at = Some(*at);
                    }
                    ApprovalTransition::Decided { approver, status, notes, at } => {
                        entry.approval_status = *status;
                        entry.decided_by = Some(*approver);
                        entry.decided_at = Some(*at);
                        entry.decision_notes = notes.clone();
                        entry.updated_at = Some(*at);
                    }
                    ApprovalTransition::Reopened { at } => {
                        entry.approval_status = ApprovalStatus::Pending;
                        entry.requested_by = None;
                        entry.requested_at = None;
                        entry.decided_by = None;
                        entry.decided_at = None;
                        entry.decision_notes = None;
                        entry.updated_at = Some(*at);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_deductions(
        &self,
        entry_id: Uuid,
        deductions: Deductions,
        final_amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&entry_id) {
            Some(entry) if entry.approval_status == ApprovalStatus::Pending => {
                entry.deductions = deductions;
                entry.final_amount = final_amount;
                entry.updated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_entry_reference(
        &self,
        entry_id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        match inner.entries.get_mut(&entry_id) {
            Some(entry) => {
                entry.external_reference = Some(reference.to_string());
                entry.updated_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reject_open_entries(
        &self,
        document_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut rejected = 0;
        for entry in inner.entries.values_mut() {
            if entry.document_id == document_id
                && matches!(
                    entry.approval_status,
                    ApprovalStatus::Pending | ApprovalStatus::Requested
                )
            {
                entry.approval_status = ApprovalStatus::Rejected;
                entry.decided_at = Some(at);
                entry.decision_notes = Some("document cancelled".to_string());
                entry.updated_at = Some(at);
                rejected += 1;
            }
        }
        Ok(rejected)
    }

    async fn insert_role_assignment(&self, assignment: &RoleAssignment) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.assignments.push(assignment.clone());
        Ok(())
    }

    async fn role_holders(
        &self,
        role: Role,
        branch_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let inner = self.inner.lock().await;
        let mut holders: Vec<RoleAssignment> = inner
            .assignments
            .iter()
            .filter(|a| a.role == role && a.branch_id == branch_id && a.is_current_at(as_of))
            .cloned()
            .collect();
        holders.sort_by(|a, b| {
            b.effective_from
                .cmp(&a.effective_from)
                .then(a.user_id.cmp(&b.user_id))
        });
        Ok(holders)
    }
}
