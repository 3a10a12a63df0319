//! Document intake and lifecycle: creation, artifact flag updates,
//! cancellation with its cascade over tasks and payment entries.

use chrono::Utc;
use payflow_shared::{ArtifactFlag, ArtifactFlags, DocumentType, SourceDocument};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::notifications::{NotificationSink, WorkflowEvent};
use crate::store::WorkflowStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewDocument {
    pub branch_id: Uuid,
    pub vendor_id: Uuid,
    pub document_type: DocumentType,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationSummary {
    pub document_id: Uuid,
    pub tasks_cancelled: u64,
    pub entries_rejected: u64,
}

pub struct DocumentService {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    pub async fn create(&self, new: NewDocument) -> WorkflowResult<SourceDocument> {
        let doc = SourceDocument {
            id: Uuid::new_v4(),
            branch_id: new.branch_id,
            vendor_id: new.vendor_id,
            document_type: new.document_type,
            gross_amount: new.gross_amount,
            net_amount: new.net_amount,
            artifacts: ArtifactFlags::default(),
            external_reference: None,
            cancelled_at: None,
            created_at: Utc::now(),
            updated_at: None,
        };
        self.store.insert_document(&doc).await?;

        tracing::info!(
            document_id = %doc.id,
            branch_id = %doc.branch_id,
            "receiving document created"
        );
        self.notifier
            .notify(WorkflowEvent::DocumentCreated {
                document_id: doc.id,
                branch_id: doc.branch_id,
                vendor_id: doc.vendor_id,
            })
            .await;

        Ok(doc)
    }

    pub async fn get(&self, id: Uuid) -> WorkflowResult<SourceDocument> {
        self.store
            .document(id)
            .await?
            .ok_or(WorkflowError::DocumentNotFound(id))
    }

    /// Out-of-band artifact capture (uploads land outside the task flow);
    /// audited via the emitted event.
    pub async fn set_artifact(
        &self,
        id: Uuid,
        flag: ArtifactFlag,
        value: bool,
        by_user: Uuid,
    ) -> WorkflowResult<SourceDocument> {
        let doc = self.get(id).await?;
        if doc.is_cancelled() {
            return Err(WorkflowError::DocumentCancelled(id));
        }

        self.store.set_artifact_flag(id, flag, value, Utc::now()).await?;

        tracing::info!(document_id = %id, flag = %flag, value, "artifact flag set");
        self.notifier
            .notify(WorkflowEvent::ArtifactFlagSet { document_id: id, flag, value, by_user })
            .await;

        self.get(id).await
    }

    /// Cancels the document and cascades: open tasks become cancelled,
    /// undecided payment entries become rejected. Idempotent.
    pub async fn cancel(&self, id: Uuid, by_user: Uuid) -> WorkflowResult<CancellationSummary> {
        let doc = self.get(id).await?;

        let now = Utc::now();
        if !doc.is_cancelled() {
            self.store.mark_document_cancelled(id, now).await?;
        }
        let tasks_cancelled = self.store.cancel_open_tasks(id, now).await?;
        let entries_rejected = self.store.reject_open_entries(id, now).await?;

        tracing::info!(
            document_id = %id,
            tasks_cancelled,
            entries_rejected,
            "document cancelled"
        );
        self.notifier
            .notify(WorkflowEvent::DocumentCancelled {
                document_id: id,
                by_user,
                tasks_cancelled,
                entries_rejected,
            })
            .await;

        Ok(CancellationSummary { document_id: id, tasks_cancelled, entries_rejected })
    }
}
