//! Role assignment replication from the HR system, plus holder lookup
//! for the resolver and the API.

use chrono::{DateTime, Utc};
use payflow_shared::{Role, RoleAssignment};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::WorkflowResult;
use crate::store::WorkflowStore;

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoleAssignment {
    pub user_id: Uuid,
    pub role: Role,
    pub branch_id: Uuid,
    pub effective_from: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

pub struct RoleService {
    store: Arc<dyn WorkflowStore>,
}

impl RoleService {
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    pub async fn ingest(&self, new: NewRoleAssignment) -> WorkflowResult<RoleAssignment> {
        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            role: new.role,
            branch_id: new.branch_id,
            effective_from: new.effective_from,
            superseded_at: new.superseded_at,
        };
        self.store.insert_role_assignment(&assignment).await?;
        tracing::info!(
            user_id = %assignment.user_id,
            role = %assignment.role,
            branch_id = %assignment.branch_id,
            "role assignment ingested"
        );
        Ok(assignment)
    }

    /// Current holders, primary assignee first.
    pub async fn holders(
        &self,
        role: Role,
        branch_id: Uuid,
    ) -> WorkflowResult<Vec<RoleAssignment>> {
        Ok(self.store.role_holders(role, branch_id, Utc::now()).await?)
    }
}
