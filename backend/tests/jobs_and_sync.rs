//! Background sweeps: overdue escalation and reference drift recovery.

mod common;

use chrono::{Duration, Utc};
use payflow_shared::{CriteriaSet, Priority, Role, Task, TaskStatus};
use rust_decimal::Decimal;
use uuid::Uuid;

use payflow_backend::jobs::EscalationSweepJob;
use payflow_backend::notifications::WorkflowEvent;

fn overdue_task(document_id: Uuid, branch_id: Uuid, role: Role, hours_overdue: i64) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4(),
        document_id,
        role,
        branch_id,
        assigned_to: Some(Uuid::new_v4()),
        status: TaskStatus::Open,
        priority: Priority::Medium,
        deadline: now - Duration::hours(hours_overdue),
        required_criteria: CriteriaSet::empty(),
        escalated_at: None,
        reassignments: Vec::new(),
        created_at: now - Duration::hours(hours_overdue + 48),
        updated_at: None,
    }
}

#[tokio::test]
async fn escalation_raises_priority_once_and_notifies_supervisor() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;

    let task = overdue_task(doc.id, h.crew.branch_id, Role::InventoryController, 6);
    h.store.insert_task_if_absent(&task).await.unwrap();
    h.notifier.clear().await;

    let sweep = EscalationSweepJob::new(h.store.clone(), h.notifier.clone());
    let result = sweep.run().await.unwrap();
    assert_eq!(result.tasks_checked, 1);
    assert_eq!(result.escalations, 1);
    assert!(result.errors.is_empty());

    let escalated = h.store.task(task.id).await.unwrap().unwrap();
    assert_eq!(escalated.priority, Priority::High);
    assert!(escalated.escalated_at.is_some());
    // Escalation informs, it never reassigns.
    assert_eq!(escalated.assigned_to, task.assigned_to);
    assert_eq!(escalated.status, TaskStatus::Open);

    let events = h.notifier.events().await;
    let escalation = events
        .iter()
        .find_map(|e| match e {
            WorkflowEvent::TaskEscalated { task_id, supervisor, priority, .. } => {
                Some((*task_id, *supervisor, *priority))
            }
            _ => None,
        })
        .expect("escalation event emitted");
    assert_eq!(escalation, (task.id, Some(Role::BranchManager), Priority::High));

    // A second sweep finds nothing left to escalate.
    let again = sweep.run().await.unwrap();
    assert_eq!(again.tasks_checked, 0);
    assert_eq!(again.escalations, 0);
}

#[tokio::test]
async fn escalation_skips_completed_and_future_tasks() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;

    let mut done = overdue_task(doc.id, h.crew.branch_id, Role::BranchManager, 3);
    done.status = TaskStatus::Completed;
    h.store.insert_task_if_absent(&done).await.unwrap();

    let mut not_due = overdue_task(doc.id, h.crew.branch_id, Role::Accountant, 3);
    not_due.deadline = Utc::now() + Duration::hours(12);
    h.store.insert_task_if_absent(&not_due).await.unwrap();

    let sweep = EscalationSweepJob::new(h.store.clone(), h.notifier.clone());
    let result = sweep.run().await.unwrap();
    assert_eq!(result.tasks_checked, 0);
    assert_eq!(result.escalations, 0);
}

#[tokio::test]
async fn administrator_tasks_escalate_without_a_supervisor() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;

    let task = overdue_task(doc.id, h.crew.branch_id, Role::Administrator, 2);
    h.store.insert_task_if_absent(&task).await.unwrap();
    h.notifier.clear().await;

    let sweep = EscalationSweepJob::new(h.store.clone(), h.notifier.clone());
    let result = sweep.run().await.unwrap();
    assert_eq!(result.escalations, 1);

    let events = h.notifier.events().await;
    assert!(events.iter().any(|e| matches!(
        e,
        WorkflowEvent::TaskEscalated { supervisor: None, .. }
    )));
}

#[tokio::test]
async fn sync_repairs_reference_drift() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(80000, 2)).await;

    // Entry exists but the document's reference was corrected afterwards.
    let entry = payflow_shared::PaymentScheduleEntry::draft(doc.id, doc.net_amount, Utc::now());
    h.store.insert_entry_if_absent(&entry).await.unwrap();
    h.store
        .set_document_reference(doc.id, "INV-2025-042", Utc::now())
        .await
        .unwrap();

    let report = h.state.sync.sync_all().await.unwrap();
    assert_eq!(report.documents_checked, 1);
    assert_eq!(report.synced_count, 1);
    assert!(report.errors.is_empty());

    let entry = h.state.payments.get(entry.id).await.unwrap();
    assert_eq!(entry.external_reference.as_deref(), Some("INV-2025-042"));

    // The sweep is idempotent.
    let again = h.state.sync.sync_all().await.unwrap();
    assert_eq!(again.documents_checked, 0);
    assert_eq!(again.synced_count, 0);
}

#[tokio::test]
async fn sync_single_document_reports_when_nothing_changed() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(80000, 2)).await;

    let entry = payflow_shared::PaymentScheduleEntry::draft(doc.id, doc.net_amount, Utc::now());
    h.store.insert_entry_if_absent(&entry).await.unwrap();
    h.store
        .set_document_reference(doc.id, "INV-9", Utc::now())
        .await
        .unwrap();

    let outcome = h.state.sync.sync_document(doc.id).await.unwrap();
    assert!(outcome.synced);
    let outcome = h.state.sync.sync_document(doc.id).await.unwrap();
    assert!(!outcome.synced);
    assert_eq!(outcome.reference.as_deref(), Some("INV-9"));
}

#[tokio::test]
async fn sync_without_a_captured_reference_is_a_no_op() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(80000, 2)).await;

    let outcome = h.state.sync.sync_document(doc.id).await.unwrap();
    assert!(!outcome.synced);
    assert!(outcome.reference.is_none());
}
