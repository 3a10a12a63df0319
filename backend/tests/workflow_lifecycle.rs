//! End-to-end task lifecycle: generation, gating, completion, the
//! terminal handoff into the payment schedule, and cancellation.

mod common;

use chrono::Utc;
use payflow_shared::{
    ApprovalStatus, ArtifactFlag, CompletionEvidence, Criterion, PaymentScheduleEntry, Role,
    TaskCompletion, TaskStatus,
};
use rust_decimal::Decimal;
use uuid::Uuid;

use payflow_backend::WorkflowError;
use payflow_backend::notifications::WorkflowEvent;
use payflow_backend::store::{CompletionGates, CompletionWrite, TerminalCompletion};

fn evidence_finished() -> CompletionEvidence {
    CompletionEvidence { finished: true, ..Default::default() }
}

#[tokio::test]
async fn generation_spawns_one_task_per_role_and_is_idempotent() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(125000, 2)).await;

    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    assert_eq!(tasks.len(), 4);

    let roles: Vec<Role> = tasks.iter().map(|t| t.role).collect();
    for role in [
        Role::BranchManager,
        Role::InventoryController,
        Role::PurchaseManager,
        Role::Accountant,
    ] {
        assert!(roles.contains(&role), "missing task for {}", role);
    }

    // Re-running returns the same four tasks, no duplicates.
    let again = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    assert_eq!(again.len(), 4);
    let mut first_ids: Vec<Uuid> = tasks.iter().map(|t| t.id).collect();
    let mut second_ids: Vec<Uuid> = again.iter().map(|t| t.id).collect();
    first_ids.sort();
    second_ids.sort();
    assert_eq!(first_ids, second_ids);
}

#[tokio::test]
async fn generation_assigns_current_role_holders() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;

    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let accountant_task = tasks.iter().find(|t| t.role == Role::Accountant).unwrap();
    assert_eq!(accountant_task.assigned_to, Some(h.crew.accountant));
    assert_eq!(accountant_task.status, TaskStatus::Open);
}

#[tokio::test]
async fn purchase_manager_blocked_until_cost_sheet_uploaded() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let pm_task = tasks.iter().find(|t| t.role == Role::PurchaseManager).unwrap();

    let err = h
        .state
        .tasks
        .complete(pm_task.id, h.crew.purchase, evidence_finished())
        .await
        .unwrap_err();
    match err {
        WorkflowError::DependenciesUnmet { unmet } => {
            assert_eq!(unmet.len(), 1);
            assert!(unmet[0].contains("cost_sheet_uploaded"));
        }
        other => panic!("expected DependenciesUnmet, got {}", other),
    }

    // Task state is untouched by the failed attempt.
    let task = h.state.tasks.get(pm_task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Open);

    h.state
        .documents
        .set_artifact(doc.id, ArtifactFlag::CostSheetUploaded, true, h.crew.purchase)
        .await
        .unwrap();

    let outcome = h
        .state
        .tasks
        .complete(pm_task.id, h.crew.purchase, evidence_finished())
        .await
        .unwrap();
    assert_eq!(outcome.task.status, TaskStatus::Completed);
    assert!(outcome.payment_entry.is_none());
}

#[tokio::test]
async fn accountant_blocked_until_predecessor_and_artifact() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let acc_task = tasks.iter().find(|t| t.role == Role::Accountant).unwrap();

    let evidence = CompletionEvidence {
        finished: true,
        external_reference: Some("INV-1".to_string()),
        ..Default::default()
    };

    let err = h
        .state
        .tasks
        .complete(acc_task.id, h.crew.accountant, evidence.clone())
        .await
        .unwrap_err();
    match err {
        WorkflowError::DependenciesUnmet { unmet } => assert_eq!(unmet.len(), 2),
        other => panic!("expected DependenciesUnmet, got {}", other),
    }

    // Satisfy the artifact gate only; the predecessor gate still holds.
    h.state
        .documents
        .set_artifact(doc.id, ArtifactFlag::PurchaseInvoiceCaptured, true, h.crew.purchase)
        .await
        .unwrap();
    let err = h
        .state
        .tasks
        .complete(acc_task.id, h.crew.accountant, evidence.clone())
        .await
        .unwrap_err();
    match err {
        WorkflowError::DependenciesUnmet { unmet } => {
            assert_eq!(unmet.len(), 1);
            assert!(unmet[0].contains("inventory_controller"));
        }
        other => panic!("expected DependenciesUnmet, got {}", other),
    }
}

#[tokio::test]
async fn missing_criteria_rejects_completion() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let inv_task = tasks
        .iter()
        .find(|t| t.role == Role::InventoryController)
        .unwrap();

    // Finished but no photo proof.
    let err = h
        .state
        .tasks
        .complete(inv_task.id, h.crew.inventory, evidence_finished())
        .await
        .unwrap_err();
    match err {
        WorkflowError::MissingCriteria { missing } => {
            assert_eq!(missing, vec![Criterion::PhotoProof]);
        }
        other => panic!("expected MissingCriteria, got {}", other),
    }

    // A blank proof URL does not count.
    let blank = CompletionEvidence {
        finished: true,
        proof_url: Some("   ".to_string()),
        ..Default::default()
    };
    assert!(matches!(
        h.state.tasks.complete(inv_task.id, h.crew.inventory, blank).await,
        Err(WorkflowError::MissingCriteria { .. })
    ));

    let ok = CompletionEvidence {
        finished: true,
        proof_url: Some("https://files.example/receiving/123.jpg".to_string()),
        ..Default::default()
    };
    let outcome = h
        .state
        .tasks
        .complete(inv_task.id, h.crew.inventory, ok)
        .await
        .unwrap();
    assert_eq!(outcome.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn outsider_cannot_act_on_a_task() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let bm_task = tasks.iter().find(|t| t.role == Role::BranchManager).unwrap();

    assert!(matches!(
        h.state
            .tasks
            .complete(bm_task.id, h.crew.outsider, evidence_finished())
            .await,
        Err(WorkflowError::NotAuthorized(_))
    ));
    assert!(matches!(
        h.state.tasks.start(bm_task.id, h.crew.outsider).await,
        Err(WorkflowError::NotAuthorized(_))
    ));
}

#[tokio::test]
async fn starting_twice_stays_in_progress_with_a_single_event() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let bm_task = tasks.iter().find(|t| t.role == Role::BranchManager).unwrap();
    h.notifier.clear().await;

    let task = h.state.tasks.start(bm_task.id, h.crew.branch_manager).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    // The repeat is a no-op: same state back, no second event.
    let task = h.state.tasks.start(bm_task.id, h.crew.branch_manager).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);

    let events = h.notifier.events().await;
    let started = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::TaskStarted { .. }))
        .count();
    assert_eq!(started, 1);
}

#[tokio::test]
async fn completing_twice_reports_already_finalized() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let bm_task = tasks.iter().find(|t| t.role == Role::BranchManager).unwrap();

    h.state
        .tasks
        .complete(bm_task.id, h.crew.branch_manager, evidence_finished())
        .await
        .unwrap();

    let err = h
        .state
        .tasks
        .complete(bm_task.id, h.crew.branch_manager, evidence_finished())
        .await
        .unwrap_err();
    match err {
        WorkflowError::AlreadyFinalized { status, .. } => {
            assert_eq!(status, TaskStatus::Completed);
        }
        other => panic!("expected AlreadyFinalized, got {}", other),
    }
}

#[tokio::test]
async fn terminal_completion_opens_payment_entry_and_stamps_reference() {
    let h = common::harness().await;
    let net = Decimal::new(125000, 2);
    let doc = h.receiving_document(net).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();

    // Inventory controller completes first (the accountant's predecessor).
    let inv_task = tasks
        .iter()
        .find(|t| t.role == Role::InventoryController)
        .unwrap();
    h.state
        .tasks
        .complete(
            inv_task.id,
            h.crew.inventory,
            CompletionEvidence {
                finished: true,
                proof_url: Some("https://files.example/photo.jpg".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    h.state
        .documents
        .set_artifact(doc.id, ArtifactFlag::PurchaseInvoiceCaptured, true, h.crew.purchase)
        .await
        .unwrap();

    let acc_task = tasks.iter().find(|t| t.role == Role::Accountant).unwrap();
    let outcome = h
        .state
        .tasks
        .complete(
            acc_task.id,
            h.crew.accountant,
            CompletionEvidence {
                finished: true,
                external_reference: Some("INV-2025-001".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let entry = outcome.payment_entry.expect("terminal completion opens entry");
    assert_eq!(entry.base_amount, net);
    assert_eq!(entry.final_amount, net);
    assert_eq!(entry.approval_status, ApprovalStatus::Pending);
    assert_eq!(entry.external_reference.as_deref(), Some("INV-2025-001"));

    let doc = h.state.documents.get(doc.id).await.unwrap();
    assert_eq!(doc.external_reference.as_deref(), Some("INV-2025-001"));

    // Only one entry per document, even if looked up independently.
    let by_doc = h.state.payments.for_document(doc.id).await.unwrap();
    assert_eq!(by_doc.id, entry.id);
}

#[tokio::test]
async fn terminal_store_write_opens_entry_with_the_completion() {
    let h = common::harness().await;
    let net = Decimal::new(90000, 2);
    let doc = h.receiving_document(net).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let acc_task = tasks.iter().find(|t| t.role == Role::Accountant).unwrap();

    let now = Utc::now();
    let completion = TaskCompletion {
        id: Uuid::new_v4(),
        task_id: acc_task.id,
        completed_by: h.crew.accountant,
        completed_at: now,
        satisfied: acc_task.required_criteria,
        proof_url: None,
        external_reference: Some("INV-2025-088".to_string()),
        notes: None,
    };
    let mut entry = PaymentScheduleEntry::draft(doc.id, net, now);
    entry.external_reference = Some("INV-2025-088".to_string());
    let terminal = TerminalCompletion {
        reference: Some("INV-2025-088".to_string()),
        entry,
    };

    let write = h
        .store
        .record_completion(
            &completion,
            &[TaskStatus::Open],
            &CompletionGates::default(),
            Some(&terminal),
        )
        .await
        .unwrap();
    assert_eq!(write, CompletionWrite::Applied);

    // The single store call persisted the task flip, the entry, and both
    // reference copies; there is no window with a completed document and
    // no payment entry.
    let task = h.state.tasks.get(acc_task.id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    let entry = h.state.payments.for_document(doc.id).await.unwrap();
    assert_eq!(entry.base_amount, net);
    assert_eq!(entry.approval_status, ApprovalStatus::Pending);
    assert_eq!(entry.external_reference.as_deref(), Some("INV-2025-088"));
    let doc = h.state.documents.get(doc.id).await.unwrap();
    assert_eq!(doc.external_reference.as_deref(), Some("INV-2025-088"));
}

#[tokio::test]
async fn reassignment_requires_authority_and_a_valid_target() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let inv_task = tasks
        .iter()
        .find(|t| t.role == Role::InventoryController)
        .unwrap();

    // A second inventory controller joins the branch.
    let second_inventory = Uuid::new_v4();
    h.state
        .roles
        .ingest(payflow_backend::services::NewRoleAssignment {
            user_id: second_inventory,
            role: Role::InventoryController,
            branch_id: h.crew.branch_id,
            effective_from: chrono::Utc::now() - chrono::Duration::days(1),
            superseded_at: None,
        })
        .await
        .unwrap();

    // The accountant has no authority over an inventory task.
    assert!(matches!(
        h.state
            .tasks
            .reassign(inv_task.id, h.crew.accountant, second_inventory, "handover".into())
            .await,
        Err(WorkflowError::NotAuthorized(_))
    ));

    // The branch manager supervises inventory controllers, but cannot
    // hand the task to someone outside the role.
    assert!(matches!(
        h.state
            .tasks
            .reassign(inv_task.id, h.crew.branch_manager, h.crew.outsider, "handover".into())
            .await,
        Err(WorkflowError::InvalidTarget(_))
    ));

    let task = h
        .state
        .tasks
        .reassign(inv_task.id, h.crew.branch_manager, second_inventory, "vacation".into())
        .await
        .unwrap();
    assert_eq!(task.assigned_to, Some(second_inventory));
    assert_eq!(task.reassignments.len(), 1);
    assert_eq!(task.reassignments[0].from_user, Some(h.crew.inventory));
    assert_eq!(task.reassignments[0].reason, "vacation");

    // The new assignee can complete it.
    let outcome = h
        .state
        .tasks
        .complete(
            inv_task.id,
            second_inventory,
            CompletionEvidence {
                finished: true,
                proof_url: Some("https://files.example/p.jpg".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.task.status, TaskStatus::Completed);
}

#[tokio::test]
async fn completed_tasks_cannot_be_reassigned() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();
    let bm_task = tasks.iter().find(|t| t.role == Role::BranchManager).unwrap();

    h.state
        .tasks
        .complete(bm_task.id, h.crew.branch_manager, evidence_finished())
        .await
        .unwrap();

    assert!(matches!(
        h.state
            .tasks
            .reassign(bm_task.id, h.crew.admin, h.crew.branch_manager, "late handover".into())
            .await,
        Err(WorkflowError::AlreadyFinalized { .. })
    ));
    let task = h.state.tasks.get(bm_task.id).await.unwrap();
    assert!(task.reassignments.is_empty());
}

#[tokio::test]
async fn cancellation_cascades_to_tasks_and_entry() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    let tasks = h.state.tasks.generate_for_document(doc.id).await.unwrap();

    // Branch manager finishes before the cancellation lands.
    let bm_task = tasks.iter().find(|t| t.role == Role::BranchManager).unwrap();
    h.state
        .tasks
        .complete(bm_task.id, h.crew.branch_manager, evidence_finished())
        .await
        .unwrap();

    let summary = h.state.documents.cancel(doc.id, h.crew.admin).await.unwrap();
    assert_eq!(summary.tasks_cancelled, 3);

    let views = h.state.tasks.views_for_document(doc.id).await.unwrap();
    for view in &views {
        if view.task.id == bm_task.id {
            assert_eq!(view.task.status, TaskStatus::Completed);
        } else {
            assert_eq!(view.task.status, TaskStatus::Cancelled);
        }
    }

    // Nothing further can happen on a cancelled document.
    let inv_task = tasks
        .iter()
        .find(|t| t.role == Role::InventoryController)
        .unwrap();
    assert!(matches!(
        h.state
            .tasks
            .complete(inv_task.id, h.crew.inventory, evidence_finished())
            .await,
        Err(WorkflowError::DocumentCancelled(_))
    ));
    assert!(matches!(
        h.state.tasks.generate_for_document(doc.id).await,
        Err(WorkflowError::DocumentCancelled(_))
    ));

    // Cancelling again is a no-op, not an error.
    let again = h.state.documents.cancel(doc.id, h.crew.admin).await.unwrap();
    assert_eq!(again.tasks_cancelled, 0);
}

#[tokio::test]
async fn task_views_project_dependency_state() {
    let h = common::harness().await;
    let doc = h.receiving_document(Decimal::new(50000, 2)).await;
    h.state.tasks.generate_for_document(doc.id).await.unwrap();

    let views = h.state.tasks.views_for_document(doc.id).await.unwrap();
    let acc_view = views
        .iter()
        .find(|v| v.task.role == Role::Accountant)
        .unwrap();
    assert_eq!(acc_view.dependencies.len(), 2);
    assert!(acc_view.dependencies.iter().all(|d| !d.satisfied));

    h.state
        .documents
        .set_artifact(doc.id, ArtifactFlag::PurchaseInvoiceCaptured, true, h.crew.purchase)
        .await
        .unwrap();

    let views = h.state.tasks.views_for_document(doc.id).await.unwrap();
    let acc_view = views
        .iter()
        .find(|v| v.task.role == Role::Accountant)
        .unwrap();
    let satisfied: Vec<bool> = acc_view.dependencies.iter().map(|d| d.satisfied).collect();
    assert!(satisfied.contains(&true));
    assert!(satisfied.contains(&false));
}
