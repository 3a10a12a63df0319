//! Task generation, dependency gating, completion, reassignment.

use chrono::{Duration, Utc};
use payflow_shared::{
    CompletionEvidence, PaymentScheduleEntry, ReassignmentRecord, Role, SourceDocument, Task,
    TaskCompletion, TaskStatus,
};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::notifications::{NotificationSink, WorkflowEvent};
use crate::services::templates::{TaskDependency, TemplateRegistry};
use crate::store::{CompletionGates, CompletionWrite, TerminalCompletion, WorkflowStore};

/// A task together with the current standing of its completion gates.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub dependencies: Vec<DependencyStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DependencyStatus {
    pub description: String,
    pub satisfied: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub task: Task,
    pub completion: TaskCompletion,
    /// Present only when this completion was the terminal one and opened
    /// the payment schedule entry.
    pub payment_entry: Option<PaymentScheduleEntry>,
}

pub struct TaskService {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
    templates: Arc<TemplateRegistry>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        notifier: Arc<dyn NotificationSink>,
        templates: Arc<TemplateRegistry>,
    ) -> Self {
        Self { store, notifier, templates }
    }

    pub async fn get(&self, id: Uuid) -> WorkflowResult<Task> {
        self.store.task(id).await?.ok_or(WorkflowError::TaskNotFound(id))
    }

    /// Spawns one task per templated role. Idempotent: roles that already
    /// carry a live task are returned as-is, never duplicated.
    pub async fn generate_for_document(&self, document_id: Uuid) -> WorkflowResult<Vec<Task>> {
        let doc = self.document(document_id).await?;
        if doc.is_cancelled() {
            return Err(WorkflowError::DocumentCancelled(document_id));
        }
        let template = self
            .templates
            .for_document_type(doc.document_type)
            .ok_or(WorkflowError::TemplateMissing(doc.document_type))?;

        let now = Utc::now();
        let mut tasks = Vec::with_capacity(template.roles.len());

        for role_template in &template.roles {
            let holders = self
                .store
                .role_holders(role_template.role, doc.branch_id, now)
                .await?;
            let assigned_to = holders.first().map(|h| h.user_id);
            let also_notified: Vec<Uuid> = holders.iter().skip(1).map(|h| h.user_id).collect();

            let task = Task {
                id: Uuid::new_v4(),
                document_id,
                role: role_template.role,
                branch_id: doc.branch_id,
                assigned_to,
                status: TaskStatus::Open,
                priority: role_template.priority,
                deadline: now + Duration::hours(role_template.deadline_hours),
                required_criteria: role_template.required_criteria,
                escalated_at: None,
                reassignments: Vec::new(),
                created_at: now,
                updated_at: None,
            };

            match self.store.insert_task_if_absent(&task).await? {
                Some(existing) => tasks.push(existing),
                None => {
                    tracing::info!(
                        task_id = %task.id,
                        document_id = %document_id,
                        role = %task.role,
                        "task created"
                    );
                    self.notifier
                        .notify(WorkflowEvent::TaskCreated {
                            task_id: task.id,
                            document_id,
                            role: task.role,
                            assigned_to: task.assigned_to,
                            also_notified,
                            deadline: task.deadline,
                        })
                        .await;
                    tasks.push(task);
                }
            }
        }

        Ok(tasks)
    }

    /// Tasks for a document, each projected with the live state of its
    /// completion gates.
    pub async fn views_for_document(&self, document_id: Uuid) -> WorkflowResult<Vec<TaskView>> {
        let doc = self.document(document_id).await?;
        let tasks = self.store.tasks_for_document(document_id).await?;

        let mut views = Vec::with_capacity(tasks.len());
        for task in tasks {
            let dependencies = self.dependency_statuses(&doc, task.role).await?;
            views.push(TaskView { task, dependencies });
        }
        Ok(views)
    }

    /// Point-in-time read of one task's completion gates; re-evaluated
    /// again inside `complete`.
    pub async fn check_dependencies(&self, task_id: Uuid) -> WorkflowResult<Vec<DependencyStatus>> {
        let task = self.get(task_id).await?;
        let doc = self.document(task.document_id).await?;
        self.dependency_statuses(&doc, task.role).await
    }

    /// Claims an open task. Allowed to the assignee or any current holder
    /// of the task's role.
    pub async fn start(&self, task_id: Uuid, user_id: Uuid) -> WorkflowResult<Task> {
        let task = self.get(task_id).await?;
        if task.status.is_final() {
            return Err(WorkflowError::AlreadyFinalized { task_id, status: task.status });
        }
        self.ensure_may_act(&task, user_id).await?;

        let moved = self
            .store
            .set_task_status(task_id, &[TaskStatus::Open], TaskStatus::InProgress, Utc::now())
            .await?;
        if !moved {
            // Nothing changed, so no event. Already in progress is fine;
            // a racing cancellation or completion is not.
            let current = self.get(task_id).await?;
            if current.status.is_final() {
                return Err(WorkflowError::AlreadyFinalized { task_id, status: current.status });
            }
            return Ok(current);
        }

        self.notifier
            .notify(WorkflowEvent::TaskStarted { task_id, by_user: user_id })
            .await;
        self.get(task_id).await
    }

    /// Completes a task. All preconditions are checked up front and the
    /// state change is all-or-nothing; a task that fails any gate stays
    /// exactly as it was.
    pub async fn complete(
        &self,
        task_id: Uuid,
        user_id: Uuid,
        evidence: CompletionEvidence,
    ) -> WorkflowResult<CompletionOutcome> {
        let task = self.get(task_id).await?;
        let doc = self.document(task.document_id).await?;

        if doc.is_cancelled() {
            return Err(WorkflowError::DocumentCancelled(doc.id));
        }
        if task.status.is_final() {
            return Err(WorkflowError::AlreadyFinalized { task_id, status: task.status });
        }
        self.ensure_may_act(&task, user_id).await?;

        let unmet = self.unmet_dependencies(&doc, task.role).await?;
        if !unmet.is_empty() {
            return Err(WorkflowError::DependenciesUnmet { unmet });
        }

        let satisfied = evidence.satisfied_set();
        let missing = task.required_criteria.missing_from(satisfied);
        if !missing.is_empty() {
            return Err(WorkflowError::MissingCriteria { missing });
        }

        let template = self
            .templates
            .for_document_type(doc.document_type)
            .ok_or(WorkflowError::TemplateMissing(doc.document_type))?;
        let role_template = template.role_template(task.role);
        let is_terminal = role_template.is_some_and(|t| t.terminal);

        let mut gates = CompletionGates { document_id: doc.id, ..Default::default() };
        for dep in role_template.map(|t| t.dependencies.as_slice()).unwrap_or_default() {
            match dep {
                TaskDependency::Artifact(flag) => gates.artifacts.push(*flag),
                TaskDependency::Predecessor(role) => gates.predecessors.push(*role),
            }
        }

        let now = Utc::now();
        let completion = TaskCompletion {
            id: Uuid::new_v4(),
            task_id,
            completed_by: user_id,
            completed_at: now,
            satisfied,
            proof_url: evidence.proof_url.clone(),
            external_reference: evidence.external_reference.clone(),
            notes: evidence.notes.clone(),
        };

        // The terminal role's completion stamps the captured reference on
        // the document and opens the payment entry, all in the same store
        // transaction as the completion itself.
        let terminal = if is_terminal {
            let reference = evidence
                .external_reference
                .as_deref()
                .map(|r| r.trim().to_string());
            let mut entry = PaymentScheduleEntry::draft(doc.id, doc.net_amount, now);
            entry.external_reference = reference.clone();
            Some(TerminalCompletion { reference, entry })
        } else {
            None
        };

        let write = self
            .store
            .record_completion(
                &completion,
                &[TaskStatus::Open, TaskStatus::InProgress],
                &gates,
                terminal.as_ref(),
            )
            .await?;
        match write {
            CompletionWrite::Applied => {}
            CompletionWrite::StatusConflict => {
                // Lost a race; report the status the winner left behind.
                let current = self.get(task_id).await?;
                return Err(WorkflowError::AlreadyFinalized { task_id, status: current.status });
            }
            CompletionWrite::GatesFailed => {
                // A gate flipped between our read and the write.
                let doc = self.document(task.document_id).await?;
                let unmet = self.unmet_dependencies(&doc, task.role).await?;
                return Err(WorkflowError::DependenciesUnmet { unmet });
            }
        }

        tracing::info!(
            task_id = %task_id,
            document_id = %doc.id,
            role = %task.role,
            "task completed"
        );
        self.notifier
            .notify(WorkflowEvent::TaskCompleted {
                task_id,
                document_id: doc.id,
                role: task.role,
                by_user: user_id,
                satisfied: satisfied.iter().collect(),
            })
            .await;

        let payment_entry = match terminal {
            Some(t) => {
                tracing::info!(
                    entry_id = %t.entry.id,
                    document_id = %doc.id,
                    "payment schedule entry opened"
                );
                self.notifier
                    .notify(WorkflowEvent::PaymentEntryCreated {
                        entry_id: t.entry.id,
                        document_id: doc.id,
                        base_amount: t.entry.base_amount,
                    })
                    .await;
                let entry = self
                    .store
                    .payment_entry_for_document(doc.id)
                    .await?
                    .ok_or(WorkflowError::EntryNotFound(doc.id))?;
                if let Some(reference) = t.reference {
                    self.notifier
                        .notify(WorkflowEvent::ReferenceSynced {
                            document_id: doc.id,
                            entry_id: entry.id,
                            reference,
                        })
                        .await;
                }
                Some(entry)
            }
            None => None,
        };

        let task = self.get(task_id).await?;
        Ok(CompletionOutcome { task, completion, payment_entry })
    }

    /// Moves ownership of a live task. Allowed to the current assignee,
    /// holders of the role's supervisor role, and administrators.
    pub async fn reassign(
        &self,
        task_id: Uuid,
        by_user: Uuid,
        to_user: Uuid,
        reason: String,
    ) -> WorkflowResult<Task> {
        let task = self.get(task_id).await?;
        if task.status.is_final() {
            return Err(WorkflowError::AlreadyFinalized { task_id, status: task.status });
        }

        let now = Utc::now();
        let mut allowed = task.assigned_to == Some(by_user);
        if !allowed {
            if let Some(supervisor) = task.role.supervisor() {
                allowed = self
                    .store
                    .user_holds_role(by_user, supervisor, task.branch_id, now)
                    .await?;
            }
        }
        if !allowed {
            allowed = self
                .store
                .user_holds_role(by_user, Role::Administrator, task.branch_id, now)
                .await?;
        }
        if !allowed {
            return Err(WorkflowError::NotAuthorized(
                "Only the assignee, a supervisor, or an administrator may reassign".to_string(),
            ));
        }

        let target_holds_role = self
            .store
            .user_holds_role(to_user, task.role, task.branch_id, now)
            .await?;
        if !target_holds_role {
            return Err(WorkflowError::InvalidTarget(format!(
                "User {} does not currently hold the {} role at this branch",
                to_user, task.role
            )));
        }

        let record = ReassignmentRecord {
            from_user: task.assigned_to,
            to_user,
            by_user,
            reason: reason.clone(),
            at: now,
        };
        let applied = self.store.record_reassignment(task_id, &record).await?;
        if !applied {
            let current = self.get(task_id).await?;
            return Err(WorkflowError::AlreadyFinalized { task_id, status: current.status });
        }

        tracing::info!(task_id = %task_id, to_user = %to_user, "task reassigned");
        self.notifier
            .notify(WorkflowEvent::TaskReassigned {
                task_id,
                from_user: task.assigned_to,
                to_user,
                by_user,
                reason,
            })
            .await;

        self.get(task_id).await
    }

    async fn document(&self, id: Uuid) -> WorkflowResult<SourceDocument> {
        self.store
            .document(id)
            .await?
            .ok_or(WorkflowError::DocumentNotFound(id))
    }

    async fn ensure_may_act(&self, task: &Task, user_id: Uuid) -> WorkflowResult<()> {
        if task.assigned_to == Some(user_id) {
            return Ok(());
        }
        let holds_role = self
            .store
            .user_holds_role(user_id, task.role, task.branch_id, Utc::now())
            .await?;
        if holds_role {
            return Ok(());
        }
        Err(WorkflowError::NotAuthorized(format!(
            "User {} is neither assigned to this task nor a current {} at this branch",
            user_id, task.role
        )))
    }

    async fn dependency_statuses(
        &self,
        doc: &SourceDocument,
        role: Role,
    ) -> WorkflowResult<Vec<DependencyStatus>> {
        let Some(template) = self.templates.for_document_type(doc.document_type) else {
            return Ok(Vec::new());
        };
        let Some(role_template) = template.role_template(role) else {
            return Ok(Vec::new());
        };

        let mut statuses = Vec::with_capacity(role_template.dependencies.len());
        for dep in &role_template.dependencies {
            let satisfied = self.dependency_satisfied(doc, dep).await?;
            statuses.push(DependencyStatus { description: dep.describe(), satisfied });
        }
        Ok(statuses)
    }

    async fn unmet_dependencies(
        &self,
        doc: &SourceDocument,
        role: Role,
    ) -> WorkflowResult<Vec<String>> {
        Ok(self
            .dependency_statuses(doc, role)
            .await?
            .into_iter()
            .filter(|s| !s.satisfied)
            .map(|s| s.description)
            .collect())
    }

    async fn dependency_satisfied(
        &self,
        doc: &SourceDocument,
        dep: &TaskDependency,
    ) -> WorkflowResult<bool> {
        match dep {
            TaskDependency::Artifact(flag) => Ok(doc.artifacts.get(*flag)),
            TaskDependency::Predecessor(role) => {
                let tasks = self.store.tasks_for_document(doc.id).await?;
                Ok(tasks
                    .iter()
                    .any(|t| t.role == *role && t.status == TaskStatus::Completed))
            }
        }
    }
}
