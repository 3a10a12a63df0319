//! ERP reference propagation. The document's external reference is the
//! source of truth; the payment entry's copy is brought in line here and
//! by the periodic recovery sweep.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{WorkflowError, WorkflowResult};
use crate::notifications::{NotificationSink, WorkflowEvent};
use crate::store::WorkflowStore;

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub document_id: Uuid,
    /// True when this call copied the reference across; false when there
    /// was nothing to do (already consistent, no reference captured yet,
    /// or no payment entry yet).
    pub synced: bool,
    pub entry_id: Option<Uuid>,
    pub reference: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct BulkSyncReport {
    pub documents_checked: usize,
    pub synced_count: usize,
    pub skipped_count: usize,
    pub errors: Vec<String>,
}

pub struct SyncService {
    store: Arc<dyn WorkflowStore>,
    notifier: Arc<dyn NotificationSink>,
}

impl SyncService {
    pub fn new(store: Arc<dyn WorkflowStore>, notifier: Arc<dyn NotificationSink>) -> Self {
        Self { store, notifier }
    }

    /// Pushes one document's reference onto its payment entry. Safe to
    /// call repeatedly; "nothing to do" is a successful no-op.
    pub async fn sync_document(&self, document_id: Uuid) -> WorkflowResult<SyncOutcome> {
        let doc = self
            .store
            .document(document_id)
            .await?
            .ok_or(WorkflowError::DocumentNotFound(document_id))?;

        let Some(reference) = doc.external_reference.clone() else {
            return Ok(SyncOutcome { document_id, synced: false, entry_id: None, reference: None });
        };
        let Some(entry) = self.store.payment_entry_for_document(document_id).await? else {
            return Ok(SyncOutcome {
                document_id,
                synced: false,
                entry_id: None,
                reference: Some(reference),
            });
        };

        if entry.external_reference.as_deref() == Some(reference.as_str()) {
            return Ok(SyncOutcome {
                document_id,
                synced: false,
                entry_id: Some(entry.id),
                reference: Some(reference),
            });
        }

        self.store
            .set_entry_reference(entry.id, &reference, Utc::now())
            .await?;

        tracing::info!(document_id = %document_id, entry_id = %entry.id, "reference synced");
        self.notifier
            .notify(WorkflowEvent::ReferenceSynced {
                document_id,
                entry_id: entry.id,
                reference: reference.clone(),
            })
            .await;

        Ok(SyncOutcome {
            document_id,
            synced: true,
            entry_id: Some(entry.id),
            reference: Some(reference),
        })
    }

    /// Recovery sweep over every document whose entry drifted. One failed
    /// document never stops the rest.
    pub async fn sync_all(&self) -> WorkflowResult<BulkSyncReport> {
        let drifted = self.store.documents_with_reference_drift().await?;
        let mut report = BulkSyncReport {
            documents_checked: drifted.len(),
            ..Default::default()
        };

        for doc in drifted {
            match self.sync_document(doc.id).await {
                Ok(outcome) if outcome.synced => report.synced_count += 1,
                Ok(_) => report.skipped_count += 1,
                Err(e) => report.errors.push(format!("document {}: {}", doc.id, e)),
            }
        }

        Ok(report)
    }
}
