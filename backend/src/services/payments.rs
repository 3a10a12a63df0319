//! Payment schedule entry approval flow:
//! pending -> requested -> approved | rejected, rejected -> pending.

use chrono::Utc;
use payflow_shared::{ApprovalStatus, Deductions, PaymentScheduleEntry, Role};
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::notifications::{NotificationSink, WorkflowEvent};
use crate::store::{ApprovalTransition, WorkflowStore};

pub struct PaymentService {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn get(&self, id: Uuid) -> WorkflowResult<PaymentScheduleEntry> {
        self.store
            .payment_entry(id)
            .await?
            .ok_or(WorkflowError::EntryNotFound(id))
    }

    pub async fn for_document(&self, document_id: Uuid) -> WorkflowResult<PaymentScheduleEntry> {
        self.store
            .payment_entry_for_document(document_id)
            .await?
            .ok_or(WorkflowError::EntryNotFound(document_id))
    }

    /// Submits a pending entry for approval.
    pub async fn request_approval(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
    ) -> WorkflowResult<PaymentScheduleEntry> {
        let entry = self.get(entry_id).await?;
        self.ensure_status(&entry, ApprovalStatus::Pending)?;

        let transition = ApprovalTransition::Requested { requester: user_id, at: Utc::now() };
        let applied = self
            .store
            .apply_approval_transition(entry_id, ApprovalStatus::Pending, &transition)
            .await?;
        if !applied {
            let current = self.get(entry_id).await?;
            return Err(WorkflowError::InvalidApprovalState {
                current: current.approval_status,
                required: ApprovalStatus::Pending,
            });
        }

        tracing::info!(entry_id = %entry_id, "payment approval requested");
        self.notifier
            .notify(WorkflowEvent::ApprovalRequested { entry_id, by_user: user_id })
            .await;
        self.get(entry_id).await
    }

    /// Approves or rejects a requested entry. The decision maker must hold
    /// an approval-capable role at the document's branch and must not be
    /// the requester.
    pub async fn decide(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
        approve: bool,
        notes: Option<String>,
    ) -> WorkflowResult<PaymentScheduleEntry> {
        let entry = self.get(entry_id).await?;
        self.ensure_status(&entry, ApprovalStatus::Requested)?;

        self.ensure_approver(&entry, user_id).await?;
        if entry.requested_by == Some(user_id) {
            return Err(WorkflowError::SelfApprovalNotAllowed);
        }

        let status = if approve { ApprovalStatus::Approved } else { ApprovalStatus::Rejected };
        let transition = ApprovalTransition::Decided {
            approver: user_id,
            status,
            notes,
            at: Utc::now(),
        };
        let applied = self
            .store
            .apply_approval_transition(entry_id, ApprovalStatus::Requested, &transition)
            .await?;
        if !applied {
            let current = self.get(entry_id).await?;
            return Err(WorkflowError::InvalidApprovalState {
                current: current.approval_status,
                required: ApprovalStatus::Requested,
            });
        }

        tracing::info!(entry_id = %entry_id, status = %status, "payment approval decided");
        self.notifier
            .notify(WorkflowEvent::ApprovalDecided { entry_id, by_user: user_id, status })
            .await;
        self.get(entry_id).await
    }

    /// Returns a rejected entry to pending for correction and resubmission.
    /// Approved entries stay approved.
    pub async fn reopen(&self, entry_id: Uuid, user_id: Uuid) -> WorkflowResult<PaymentScheduleEntry> {
        let entry = self.get(entry_id).await?;
        self.ensure_status(&entry, ApprovalStatus::Rejected)?;

        let transition = ApprovalTransition::Reopened { at: Utc::now() };
        let applied = self
            .store
            .apply_approval_transition(entry_id, ApprovalStatus::Rejected, &transition)
            .await?;
        if !applied {
            let current = self.get(entry_id).await?;
            return Err(WorkflowError::InvalidApprovalState {
                current: current.approval_status,
                required: ApprovalStatus::Rejected,
            });
        }

        tracing::info!(entry_id = %entry_id, "payment entry reopened");
        self.notifier
            .notify(WorkflowEvent::EntryReopened { entry_id, by_user: user_id })
            .await;
        self.get(entry_id).await
    }

    /// Rewrites deductions on a pending entry. The submitted final amount
    /// must equal base minus the deduction total.
    pub async fn update_deductions(
        &self,
        entry_id: Uuid,
        user_id: Uuid,
        deductions: Deductions,
        final_amount: Decimal,
    ) -> WorkflowResult<PaymentScheduleEntry> {
        let entry = self.get(entry_id).await?;
        self.ensure_status(&entry, ApprovalStatus::Pending)?;

        let expected = entry.base_amount - deductions.total();
        if final_amount != expected {
            return Err(WorkflowError::AmountMismatch { expected, actual: final_amount });
        }

        let applied = self
            .store
            .update_deductions(entry_id, deductions, final_amount, Utc::now())
            .await?;
        if !applied {
            let current = self.get(entry_id).await?;
            return Err(WorkflowError::InvalidApprovalState {
                current: current.approval_status,
                required: ApprovalStatus::Pending,
            });
        }

        tracing::info!(entry_id = %entry_id, %final_amount, "deductions updated");
        self.notifier
            .notify(WorkflowEvent::DeductionsUpdated { entry_id, by_user: user_id, final_amount })
            .await;
        self.get(entry_id).await
    }

    fn ensure_status(
        &self,
        entry: &PaymentScheduleEntry,
        required: ApprovalStatus,
    ) -> WorkflowResult<()> {
        if entry.approval_status != required {
            return Err(WorkflowError::InvalidApprovalState {
                current: entry.approval_status,
                required,
            });
        }
        Ok(())
    }

    async fn ensure_approver(
        &self,
        entry: &PaymentScheduleEntry,
        user_id: Uuid,
    ) -> WorkflowResult<()> {
        let doc = self
            .store
            .document(entry.document_id)
            .await?
            .ok_or(WorkflowError::DocumentNotFound(entry.document_id))?;

        let now = Utc::now();
        let approval_roles = Role::ALL.into_iter().filter(Role::can_approve_payments);
        for role in approval_roles {
            if self.store.user_holds_role(user_id, role, doc.branch_id, now).await? {
                return Ok(());
            }
        }
        Err(WorkflowError::NotAuthorized(
            "Only purchase managers and administrators may decide payment approvals".to_string(),
        ))
    }
}
