//! Persistence seam for the workflow core.
//!
//! Every state-changing method is atomic: either a single SQL statement
//! with its status expectation in the WHERE clause, or a transaction /
//! critical section covering all of its writes. Services never compose
//! multi-step mutations outside of these methods.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payflow_shared::{
    ApprovalStatus, ArtifactFlag, Deductions, PaymentScheduleEntry, Priority, ReassignmentRecord,
    Role, RoleAssignment, SourceDocument, Task, TaskCompletion, TaskStatus,
};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Completion gates re-verified inside the completion write itself.
/// The service evaluates them first for a precise error, but only the
/// store can do so atomically with the status flip.
#[derive(Debug, Clone, Default)]
pub struct CompletionGates {
    pub document_id: Uuid,
    pub artifacts: Vec<ArtifactFlag>,
    pub predecessors: Vec<Role>,
}

impl CompletionGates {
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty() && self.predecessors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionWrite {
    Applied,
    /// The task was no longer in an expected status.
    StatusConflict,
    /// A gate no longer held at write time.
    GatesFailed,
}

/// Side effects of the terminal role's completion, committed atomically
/// with it: the captured reference stamped onto the document and the
/// draft payment schedule entry. A crash can never leave a closed-out
/// document without its entry.
#[derive(Debug, Clone)]
pub struct TerminalCompletion {
    pub reference: Option<String>,
    pub entry: PaymentScheduleEntry,
}

/// Approval mutation applied only when the entry is still in the
/// expected state, so concurrent duplicates lose the race cleanly.
#[derive(Debug, Clone)]
pub enum ApprovalTransition {
    Requested {
        requester: Uuid,
        at: DateTime<Utc>,
    },
    Decided {
        approver: Uuid,
        status: ApprovalStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    },
    Reopened {
        at: DateTime<Utc>,
    },
}

#[async_trait]
pub trait WorkflowStore: Send + Sync {
    // Documents

    async fn insert_document(&self, doc: &SourceDocument) -> Result<(), StoreError>;

    async fn document(&self, id: Uuid) -> Result<Option<SourceDocument>, StoreError>;

    async fn set_artifact_flag(
        &self,
        id: Uuid,
        flag: ArtifactFlag,
        value: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_document_reference(
        &self,
        id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn mark_document_cancelled(&self, id: Uuid, at: DateTime<Utc>)
    -> Result<bool, StoreError>;

    /// Non-cancelled documents carrying a reference their payment entry
    /// lacks (or holds a stale copy of).
    async fn documents_with_reference_drift(&self) -> Result<Vec<SourceDocument>, StoreError>;

    // Tasks

    async fn task(&self, id: Uuid) -> Result<Option<Task>, StoreError>;

    async fn tasks_for_document(&self, document_id: Uuid) -> Result<Vec<Task>, StoreError>;

    /// Inserts unless a non-cancelled task already exists for the
    /// (document, role) pair; returns the existing task when it does.
    async fn insert_task_if_absent(&self, task: &Task) -> Result<Option<Task>, StoreError>;

    /// Compare-and-set on task status. Returns false when the current
    /// status is not in `expected`.
    async fn set_task_status(
        &self,
        task_id: Uuid,
        expected: &[TaskStatus],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Writes the completion row, flips the task to completed (only from
    /// a status in `expected`) and, for the terminal role, stamps the
    /// captured reference and opens the payment schedule entry, all in
    /// one transaction. The gates are re-checked inside the same
    /// transaction; nothing is written unless the status check and every
    /// gate hold.
    async fn record_completion(
        &self,
        completion: &TaskCompletion,
        expected: &[TaskStatus],
        gates: &CompletionGates,
        terminal: Option<&TerminalCompletion>,
    ) -> Result<CompletionWrite, StoreError>;

    async fn completion_for_task(&self, task_id: Uuid)
    -> Result<Option<TaskCompletion>, StoreError>;

    /// Appends provenance and moves ownership; refused once the task is
    /// completed or cancelled.
    async fn record_reassignment(
        &self,
        task_id: Uuid,
        record: &ReassignmentRecord,
    ) -> Result<bool, StoreError>;

    async fn mark_task_escalated(
        &self,
        task_id: Uuid,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn cancel_open_tasks(&self, document_id: Uuid, at: DateTime<Utc>)
    -> Result<u64, StoreError>;

    async fn overdue_unescalated_tasks(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError>;

    // Payment schedule entries

    async fn payment_entry(&self, id: Uuid) -> Result<Option<PaymentScheduleEntry>, StoreError>;

    async fn payment_entry_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError>;

    /// One entry per document; returns the existing entry on repeat.
    async fn insert_entry_if_absent(
        &self,
        entry: &PaymentScheduleEntry,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError>;

    async fn apply_approval_transition(
        &self,
        entry_id: Uuid,
        expected: ApprovalStatus,
        transition: &ApprovalTransition,
    ) -> Result<bool, StoreError>;

    /// Deduction rewrite, only while the entry is pending.
    async fn update_deductions(
        &self,
        entry_id: Uuid,
        deductions: Deductions,
        final_amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_entry_reference(
        &self,
        entry_id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Cancellation cascade: pending/requested entries become rejected.
    async fn reject_open_entries(
        &self,
        document_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // Role assignments (owned by the HR system; the write exists for
    // ingest and tests, the workflow itself only reads)

    async fn insert_role_assignment(&self, assignment: &RoleAssignment) -> Result<(), StoreError>;

    /// Current holders of a role at a branch as of the given instant,
    /// most recent effective date first, then user id for determinism.
    async fn role_holders(
        &self,
        role: Role,
        branch_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError>;

    async fn user_holds_role(
        &self,
        user_id: Uuid,
        role: Role,
        branch_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        Ok(self
            .role_holders(role, branch_id, as_of)
            .await?
            .iter()
            .any(|a| a.user_id == user_id))
    }
}
