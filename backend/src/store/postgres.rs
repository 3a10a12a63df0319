//! Postgres-backed store. All SQL is runtime-bound; status expectations
//! live in the WHERE clause of the statement that writes the new state,
//! multi-write operations run inside an explicit transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use payflow_shared::{
    ApprovalStatus, ArtifactFlag, ArtifactFlags, Deductions, PaymentScheduleEntry, Priority,
    ReassignmentRecord, Role, RoleAssignment, SourceDocument, Task, TaskCompletion, TaskStatus,
    UnknownValue,
};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;
use uuid::Uuid;

use super::{
    ApprovalTransition, CompletionGates, CompletionWrite, StoreError, TerminalCompletion,
    WorkflowStore,
};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse<T>(value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = UnknownValue>,
{
    value.parse().map_err(|e: UnknownValue| StoreError::Corrupt(e.to_string()))
}

fn status_strings(statuses: &[TaskStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[derive(Debug, FromRow)]
struct DocumentRow {
    id: Uuid,
    branch_id: Uuid,
    vendor_id: Uuid,
    document_type: String,
    gross_amount: Decimal,
    net_amount: Decimal,
    purchase_invoice_captured: bool,
    cost_sheet_uploaded: bool,
    original_bill_uploaded: bool,
    external_reference: Option<String>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<DocumentRow> for SourceDocument {
    type Error = StoreError;

    fn try_from(row: DocumentRow) -> Result<Self, Self::Error> {
        Ok(SourceDocument {
            id: row.id,
            branch_id: row.branch_id,
            vendor_id: row.vendor_id,
            document_type: parse(&row.document_type)?,
            gross_amount: row.gross_amount,
            net_amount: row.net_amount,
            artifacts: ArtifactFlags {
                purchase_invoice_captured: row.purchase_invoice_captured,
                cost_sheet_uploaded: row.cost_sheet_uploaded,
                original_bill_uploaded: row.original_bill_uploaded,
            },
            external_reference: row.external_reference,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: Uuid,
    document_id: Uuid,
    role: String,
    branch_id: Uuid,
    assigned_to: Option<Uuid>,
    status: String,
    priority: String,
    deadline: DateTime<Utc>,
    required_criteria: i16,
    escalated_at: Option<DateTime<Utc>>,
    reassignments: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let reassignments: Vec<ReassignmentRecord> = serde_json::from_str(&row.reassignments)
            .map_err(|e| StoreError::Corrupt(format!("task {} reassignments: {}", row.id, e)))?;
        Ok(Task {
            id: row.id,
            document_id: row.document_id,
            role: parse(&row.role)?,
            branch_id: row.branch_id,
            assigned_to: row.assigned_to,
            status: parse(&row.status)?,
            priority: parse(&row.priority)?,
            deadline: row.deadline,
            required_criteria: payflow_shared::CriteriaSet::from_bits(row.required_criteria),
            escalated_at: row.escalated_at,
            reassignments,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct CompletionRow {
    id: Uuid,
    task_id: Uuid,
    completed_by: Uuid,
    completed_at: DateTime<Utc>,
    satisfied: i16,
    proof_url: Option<String>,
    external_reference: Option<String>,
    notes: Option<String>,
}

impl From<CompletionRow> for TaskCompletion {
    fn from(row: CompletionRow) -> Self {
        TaskCompletion {
            id: row.id,
            task_id: row.task_id,
            completed_by: row.completed_by,
            completed_at: row.completed_at,
            satisfied: payflow_shared::CriteriaSet::from_bits(row.satisfied),
            proof_url: row.proof_url,
            external_reference: row.external_reference,
            notes: row.notes,
        }
    }
}

#[derive(Debug, FromRow)]
struct EntryRow {
    id: Uuid,
    document_id: Uuid,
    base_amount: Decimal,
    shortage_deduction: Decimal,
    damage_deduction: Decimal,
    adjustment_deduction: Decimal,
    final_amount: Decimal,
    approval_status: String,
    external_reference: Option<String>,
    requested_by: Option<Uuid>,
    requested_at: Option<DateTime<Utc>>,
    decided_by: Option<Uuid>,
    decided_at: Option<DateTime<Utc>>,
    decision_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<EntryRow> for PaymentScheduleEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(PaymentScheduleEntry {
            id: row.id,
            document_id: row.document_id,
            base_amount: row.base_amount,
            deductions: Deductions {
                shortage: row.shortage_deduction,
                damage: row.damage_deduction,
                adjustment: row.adjustment_deduction,
            },
            final_amount: row.final_amount,
            approval_status: parse(&row.approval_status)?,
            external_reference: row.external_reference,
            requested_by: row.requested_by,
            requested_at: row.requested_at,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            decision_notes: row.decision_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct AssignmentRow {
    id: Uuid,
    user_id: Uuid,
    role: String,
    branch_id: Uuid,
    effective_from: DateTime<Utc>,
    superseded_at: Option<DateTime<Utc>>,
}

impl TryFrom<AssignmentRow> for RoleAssignment {
    type Error = StoreError;

    fn try_from(row: AssignmentRow) -> Result<Self, Self::Error> {
        Ok(RoleAssignment {
            id: row.id,
            user_id: row.user_id,
            role: parse(&row.role)?,
            branch_id: row.branch_id,
            effective_from: row.effective_from,
            superseded_at: row.superseded_at,
        })
    }
}

const DOCUMENT_COLUMNS: &str = "id, branch_id, vendor_id, document_type, gross_amount, net_amount, \
     purchase_invoice_captured, cost_sheet_uploaded, original_bill_uploaded, \
     external_reference, cancelled_at, created_at, updated_at";

const TASK_COLUMNS: &str = "id, document_id, role, branch_id, assigned_to, status, priority, deadline, \
     required_criteria, escalated_at, reassignments, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, document_id, base_amount, shortage_deduction, damage_deduction, \
     adjustment_deduction, final_amount, approval_status, external_reference, \
     requested_by, requested_at, decided_by, decided_at, decision_notes, \
     created_at, updated_at";

#[async_trait]
impl WorkflowStore for PgStore {
    async fn insert_document(&self, doc: &SourceDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO source_documents (
                id, branch_id, vendor_id, document_type, gross_amount, net_amount,
                purchase_invoice_captured, cost_sheet_uploaded, original_bill_uploaded,
                external_reference, cancelled_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(doc.id)
        .bind(doc.branch_id)
        .bind(doc.vendor_id)
        .bind(doc.document_type.as_str())
        .bind(doc.gross_amount)
        .bind(doc.net_amount)
        .bind(doc.artifacts.purchase_invoice_captured)
        .bind(doc.artifacts.cost_sheet_uploaded)
        .bind(doc.artifacts.original_bill_uploaded)
        .bind(&doc.external_reference)
        .bind(doc.cancelled_at)
        .bind(doc.created_at)
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn document(&self, id: Uuid) -> Result<Option<SourceDocument>, StoreError> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM source_documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(SourceDocument::try_from).transpose()
    }

    async fn set_artifact_flag(
        &self,
        id: Uuid,
        flag: ArtifactFlag,
        value: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Column name comes from the enum, never from caller input.
        let result = sqlx::query(&format!(
            "UPDATE source_documents SET {} = $2, updated_at = $3 WHERE id = $1",
            flag.as_str()
        ))
        .bind(id)
        .bind(value)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_document_reference(
        &self,
        id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE source_documents SET external_reference = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(reference)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_document_cancelled(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE source_documents SET cancelled_at = $2, updated_at = $2
             WHERE id = $1 AND cancelled_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn documents_with_reference_drift(&self) -> Result<Vec<SourceDocument>, StoreError> {
        let rows = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {} FROM source_documents d
             JOIN payment_schedule_entries e ON e.document_id = d.id
             WHERE d.cancelled_at IS NULL
               AND d.external_reference IS NOT NULL
               AND (e.external_reference IS NULL OR e.external_reference <> d.external_reference)
             ORDER BY d.created_at",
            DOCUMENT_COLUMNS
                .split(", ")
                .map(|c| format!("d.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(SourceDocument::try_from).collect()
    }

    async fn task(&self, id: Uuid) -> Result<Option<Task>, StoreError> {
        let row = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Task::try_from).transpose()
    }

    async fn tasks_for_document(&self, document_id: Uuid) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE document_id = $1 ORDER BY created_at, id"
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn insert_task_if_absent(&self, task: &Task) -> Result<Option<Task>, StoreError> {
        let reassignments = serde_json::to_string(&task.reassignments)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO tasks (
                id, document_id, role, branch_id, assigned_to, status, priority,
                deadline, required_criteria, escalated_at, reassignments, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (document_id, role) WHERE status <> 'cancelled' DO NOTHING",
        )
        .bind(task.id)
        .bind(task.document_id)
        .bind(task.role.as_str())
        .bind(task.branch_id)
        .bind(task.assigned_to)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(task.deadline)
        .bind(task.required_criteria.bits())
        .bind(task.escalated_at)
        .bind(reassignments)
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(None);
        }

        let existing = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE document_id = $1 AND role = $2 AND status <> 'cancelled'"
        ))
        .bind(task.document_id)
        .bind(task.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(Some(Task::try_from(existing)?))
    }

    async fn set_task_status(
        &self,
        task_id: Uuid,
        expected: &[TaskStatus],
        status: TaskStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = $3, updated_at = $4
             WHERE id = $1 AND status = ANY($2)",
        )
        .bind(task_id)
        .bind(status_strings(expected))
        .bind(status.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_completion(
        &self,
        completion: &TaskCompletion,
        expected: &[TaskStatus],
        gates: &CompletionGates,
        terminal: Option<&TerminalCompletion>,
    ) -> Result<CompletionWrite, StoreError> {
        let mut tx = self.pool.begin().await?;

        if !gates.is_empty() {
            // Locking the document row orders this check against any
            // concurrent artifact flag write.
            let row = sqlx::query_as::<_, DocumentRow>(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM source_documents WHERE id = $1 FOR UPDATE"
            ))
            .bind(gates.document_id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(row) = row else {
                tx.rollback().await?;
                return Ok(CompletionWrite::GatesFailed);
            };
            let doc = SourceDocument::try_from(row)?;
            if gates.artifacts.iter().any(|f| !doc.artifacts.get(*f)) {
                tx.rollback().await?;
                return Ok(CompletionWrite::GatesFailed);
            }
            for role in &gates.predecessors {
                let done: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM tasks
                     WHERE document_id = $1 AND role = $2 AND status = 'completed'",
                )
                .bind(gates.document_id)
                .bind(role.as_str())
                .fetch_one(&mut *tx)
                .await?;
                if done == 0 {
                    tx.rollback().await?;
                    return Ok(CompletionWrite::GatesFailed);
                }
            }
        }

        let transitioned = sqlx::query(
            "UPDATE tasks SET status = 'completed', updated_at = $3
             WHERE id = $1 AND status = ANY($2)",
        )
        .bind(completion.task_id)
        .bind(status_strings(expected))
        .bind(completion.completed_at)
        .execute(&mut *tx)
        .await?;

        if transitioned.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CompletionWrite::StatusConflict);
        }

        sqlx::query(
            "INSERT INTO task_completions (
                id, task_id, completed_by, completed_at, satisfied,
                proof_url, external_reference, notes
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(completion.id)
        .bind(completion.task_id)
        .bind(completion.completed_by)
        .bind(completion.completed_at)
        .bind(completion.satisfied.bits())
        .bind(&completion.proof_url)
        .bind(&completion.external_reference)
        .bind(&completion.notes)
        .execute(&mut *tx)
        .await?;

        if let Some(terminal) = terminal {
            let entry = &terminal.entry;
            if let Some(reference) = &terminal.reference {
                sqlx::query(
                    "UPDATE source_documents SET external_reference = $2, updated_at = $3
                     WHERE id = $1",
                )
                .bind(entry.document_id)
                .bind(reference)
                .bind(completion.completed_at)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                "INSERT INTO payment_schedule_entries (
                    id, document_id, base_amount, shortage_deduction, damage_deduction,
                    adjustment_deduction, final_amount, approval_status, external_reference,
                    requested_by, requested_at, decided_by, decided_at, decision_notes,
                    created_at, updated_at
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                ON CONFLICT (document_id) DO NOTHING",
            )
            .bind(entry.id)
            .bind(entry.document_id)
            .bind(entry.base_amount)
            .bind(entry.deductions.shortage)
            .bind(entry.deductions.damage)
            .bind(entry.deductions.adjustment)
            .bind(entry.final_amount)
            .bind(entry.approval_status.as_str())
            .bind(&entry.external_reference)
            .bind(entry.requested_by)
            .bind(entry.requested_at)
            .bind(entry.decided_by)
            .bind(entry.decided_at)
            .bind(&entry.decision_notes)
            .bind(entry.created_at)
            .bind(entry.updated_at)
            .execute(&mut *tx)
            .await?;

            // If the insert lost to an existing entry, bring that entry's
            // reference in line here rather than in a follow-up call.
            if let Some(reference) = &terminal.reference {
                sqlx::query(
                    "UPDATE payment_schedule_entries
                     SET external_reference = $2, updated_at = $3
                     WHERE document_id = $1
                       AND (external_reference IS NULL OR external_reference <> $2)",
                )
                .bind(entry.document_id)
                .bind(reference)
                .bind(completion.completed_at)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(CompletionWrite::Applied)
    }

    async fn completion_for_task(
        &self,
        task_id: Uuid,
    ) -> Result<Option<TaskCompletion>, StoreError> {
        let row = sqlx::query_as::<_, CompletionRow>(
            "SELECT id, task_id, completed_by, completed_at, satisfied,
                    proof_url, external_reference, notes
             FROM task_completions WHERE task_id = $1",
        )
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(TaskCompletion::from))
    }

    async fn record_reassignment(
        &self,
        task_id: Uuid,
        record: &ReassignmentRecord,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, String)> = sqlx::query_as(
            "SELECT status, reassignments FROM tasks WHERE id = $1 FOR UPDATE",
        )
        .bind(task_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((status, history)) = current else {
            tx.rollback().await?;
            return Ok(false);
        };
        let status: TaskStatus = parse(&status)?;
        if status.is_final() {
            tx.rollback().await?;
            return Ok(false);
        }

        let mut reassignments: Vec<ReassignmentRecord> = serde_json::from_str(&history)
            .map_err(|e| StoreError::Corrupt(format!("task {} reassignments: {}", task_id, e)))?;
        reassignments.push(record.clone());
        let history = serde_json::to_string(&reassignments)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        sqlx::query(
            "UPDATE tasks SET assigned_to = $2, reassignments = $3, updated_at = $4
             WHERE id = $1",
        )
        .bind(task_id)
        .bind(record.to_user)
        .bind(history)
        .bind(record.at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_task_escalated(
        &self,
        task_id: Uuid,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET priority = $2, escalated_at = $3, updated_at = $3
             WHERE id = $1 AND status IN ('open', 'in_progress') AND escalated_at IS NULL",
        )
        .bind(task_id)
        .bind(priority.as_str())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn cancel_open_tasks(
        &self,
        document_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE tasks SET status = 'cancelled', updated_at = $2
             WHERE document_id = $1 AND status IN ('open', 'in_progress')",
        )
        .bind(document_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn overdue_unescalated_tasks(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE status IN ('open', 'in_progress')
               AND escalated_at IS NULL
               AND deadline < $1
             ORDER BY deadline"
        ))
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn payment_entry(&self, id: Uuid) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payment_schedule_entries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentScheduleEntry::try_from).transpose()
    }

    async fn payment_entry_for_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let row = sqlx::query_as::<_, EntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM payment_schedule_entries WHERE document_id = $1"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PaymentScheduleEntry::try_from).transpose()
    }

    async fn insert_entry_if_absent(
        &self,
        entry: &PaymentScheduleEntry,
    ) -> Result<Option<PaymentScheduleEntry>, StoreError> {
        let result = sqlx::query(
            "INSERT INTO payment_schedule_entries (
                id, document_id, base_amount, shortage_deduction, damage_deduction,
                adjustment_deduction, final_amount, approval_status, external_reference,
                requested_by, requested_at, decided_by, decided_at, decision_notes,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (document_id) DO NOTHING",
        )
        .bind(entry.id)
        .bind(entry.document_id)
        .bind(entry.base_amount)
        .bind(entry.deductions.shortage)
        .bind(entry.deductions.damage)
        .bind(entry.deductions.adjustment)
        .bind(entry.final_amount)
        .bind(entry.approval_status.as_str())
        .bind(&entry.external_reference)
        .bind(entry.requested_by)
        .bind(entry.requested_at)
        .bind(entry.decided_by)
        .bind(entry.decided_at)
        .bind(&entry.decision_notes)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(None);
        }
        self.payment_entry_for_document(entry.document_id).await
    }

    async fn apply_approval_transition(
        &self,
        entry_id: Uuid,
        expected: ApprovalStatus,
        transition: &ApprovalTransition,
    ) -> Result<bool, StoreError> {
        let result = match transition {
            ApprovalTransition::Requested { requester, at } => {
                sqlx::query(
                    "UPDATE payment_schedule_entries
                     SET approval_status = 'requested', requested_by = $3,
                         requested_at = $4, updated_at = $4
                     WHERE id = $1 AND approval_status = $2",
                )
                .bind(entry_id)
                .bind(expected.as_str())
                .bind(requester)
                .bind(at)
                .execute(&self.pool)
                .await?
            }
            ApprovalTransition::Decided { approver, status, notes, at } => {
                sqlx::query(
                    "UPDATE payment_schedule_entries
                     SET approval_status = $3, decided_by = $4, decided_at = $5,
                         decision_notes = $6, updated_at = $5
                     WHERE id = $1 AND approval_status = $2",
                )
                .bind(entry_id)
                .bind(expected.as_str())
                .bind(status.as_str())
                .bind(approver)
                .bind(at)
                .bind(notes)
                .execute(&self.pool)
                .await?
            }
            ApprovalTransition::Reopened { at } => {
                sqlx::query(
                    "UPDATE payment_schedule_entries
                     SET approval_status = 'pending', requested_by = NULL, requested_at = NULL,
                         decided_by = NULL, decided_at = NULL, decision_notes = NULL,
                         updated_at = $3
                     WHERE id = $1 AND approval_status = $2",
                )
                .bind(entry_id)
                .bind(expected.as_str())
                .bind(at)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn update_deductions(
        &self,
        entry_id: Uuid,
        deductions: Deductions,
        final_amount: Decimal,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payment_schedule_entries
             SET shortage_deduction = $2, damage_deduction = $3, adjustment_deduction = $4,
                 final_amount = $5, updated_at = $6
             WHERE id = $1 AND approval_status = 'pending'",
        )
        .bind(entry_id)
        .bind(deductions.shortage)
        .bind(deductions.damage)
        .bind(deductions.adjustment)
        .bind(final_amount)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_entry_reference(
        &self,
        entry_id: Uuid,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE payment_schedule_entries
             SET external_reference = $2, updated_at = $3
             WHERE id = $1",
        )
        .bind(entry_id)
        .bind(reference)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn reject_open_entries(
        &self,
        document_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE payment_schedule_entries
             SET approval_status = 'rejected', decided_at = $2,
                 decision_notes = 'document cancelled', updated_at = $2
             WHERE document_id = $1 AND approval_status IN ('pending', 'requested')",
        )
        .bind(document_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn insert_role_assignment(&self, assignment: &RoleAssignment) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO role_assignments (
                id, user_id, role, branch_id, effective_from, superseded_at
            ) VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(assignment.id)
        .bind(assignment.user_id)
        .bind(assignment.role.as_str())
        .bind(assignment.branch_id)
        .bind(assignment.effective_from)
        .bind(assignment.superseded_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn role_holders(
        &self,
        role: Role,
        branch_id: Uuid,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<RoleAssignment>, StoreError> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            "SELECT id, user_id, role, branch_id, effective_from, superseded_at
             FROM role_assignments
             WHERE role = $1 AND branch_id = $2
               AND effective_from <= $3
               AND (superseded_at IS NULL OR superseded_at > $3)
             ORDER BY effective_from DESC, user_id",
        )
        .bind(role.as_str())
        .bind(branch_id)
        .bind(as_of)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(RoleAssignment::try_from).collect()
    }
}
