//! Standardized error handling for the workflow API.
//!
//! Every precondition failure is a typed variant returned to the caller;
//! nothing here is fatal to the process.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use payflow_shared::{ApprovalStatus, Criterion, DocumentType, TaskStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::store::StoreError;

/// Standard API error response envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code (e.g. "DEPENDENCIES_UNMET", "NOT_AUTHORIZED")
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional structured details (unmet dependencies, missing criteria)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, Vec<String>>>,
    /// ISO 8601 timestamp
    pub timestamp: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Typed failure of a single workflow operation on a single entity.
#[derive(Debug)]
pub enum WorkflowError {
    // Lookup failures
    DocumentNotFound(Uuid),
    TaskNotFound(Uuid),
    EntryNotFound(Uuid),
    TemplateMissing(DocumentType),

    // Task preconditions
    AlreadyFinalized { task_id: Uuid, status: TaskStatus },
    NotAuthorized(String),
    DependenciesUnmet { unmet: Vec<String> },
    MissingCriteria { missing: Vec<Criterion> },
    InvalidTarget(String),

    // Approval preconditions
    InvalidApprovalState { current: ApprovalStatus, required: ApprovalStatus },
    SelfApprovalNotAllowed,
    AmountMismatch { expected: Decimal, actual: Decimal },

    // Document preconditions
    DocumentCancelled(Uuid),

    // Infrastructure
    Store(StoreError),
    Internal(String),
}

impl WorkflowError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DocumentNotFound(_) | Self::TaskNotFound(_) | Self::EntryNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::TemplateMissing(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyFinalized { .. } => StatusCode::CONFLICT,
            Self::NotAuthorized(_) | Self::SelfApprovalNotAllowed => StatusCode::FORBIDDEN,
            Self::DependenciesUnmet { .. } => StatusCode::CONFLICT,
            Self::MissingCriteria { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTarget(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidApprovalState { .. } => StatusCode::CONFLICT,
            Self::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::DocumentCancelled(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DocumentNotFound(_) => "DOCUMENT_NOT_FOUND",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            Self::TemplateMissing(_) => "TEMPLATE_MISSING",
            Self::AlreadyFinalized { .. } => "ALREADY_FINALIZED",
            Self::NotAuthorized(_) => "NOT_AUTHORIZED",
            Self::DependenciesUnmet { .. } => "DEPENDENCIES_UNMET",
            Self::MissingCriteria { .. } => "MISSING_CRITERIA",
            Self::InvalidTarget(_) => "INVALID_TARGET",
            Self::InvalidApprovalState { .. } => "INVALID_APPROVAL_STATE",
            Self::SelfApprovalNotAllowed => "SELF_APPROVAL_NOT_ALLOWED",
            Self::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            Self::DocumentCancelled(_) => "DOCUMENT_CANCELLED",
            Self::Store(_) => "DATABASE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::DocumentNotFound(id) => format!("Document {} not found", id),
            Self::TaskNotFound(id) => format!("Task {} not found", id),
            Self::EntryNotFound(id) => format!("Payment schedule entry {} not found", id),
            Self::TemplateMissing(doc_type) => {
                format!("No role template registered for document type '{}'", doc_type)
            }
            Self::AlreadyFinalized { task_id, status } => {
                format!("Task {} is already {}", task_id, status)
            }
            Self::NotAuthorized(msg) => msg.clone(),
            Self::DependenciesUnmet { unmet } => {
                format!("Dependencies unmet: {}", unmet.join("; "))
            }
            Self::MissingCriteria { missing } => {
                let names: Vec<&str> = missing.iter().map(|c| c.as_str()).collect();
                format!("Missing completion criteria: {}", names.join(", "))
            }
            Self::InvalidTarget(msg) => msg.clone(),
            Self::InvalidApprovalState { current, required } => {
                format!("Entry is {}, operation requires {}", current, required)
            }
            Self::SelfApprovalNotAllowed => {
                "Requester cannot approve their own payment entry".to_string()
            }
            Self::AmountMismatch { expected, actual } => {
                format!("Final amount {} does not equal base minus deductions ({})", actual, expected)
            }
            Self::DocumentCancelled(id) => format!("Document {} is cancelled", id),
            Self::Store(err) => {
                tracing::error!("Store error: {}", err);
                "A database error occurred".to_string()
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                "An internal error occurred".to_string()
            }
        }
    }

    fn details(&self) -> Option<HashMap<String, Vec<String>>> {
        match self {
            Self::DependenciesUnmet { unmet } => {
                let mut details = HashMap::new();
                details.insert("unmet".to_string(), unmet.clone());
                Some(details)
            }
            Self::MissingCriteria { missing } => {
                let mut details = HashMap::new();
                details.insert(
                    "missing".to_string(),
                    missing.iter().map(|c| c.as_str().to_string()).collect(),
                );
                Some(details)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.message())
    }
}

impl std::error::Error for WorkflowError {}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let mut error = ApiError::new(self.error_code(), self.message());
        error.details = self.details();
        (status, Json(error)).into_response()
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

/// Result type alias for workflow operations and handlers.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_and_status() {
        let err = WorkflowError::DocumentNotFound(Uuid::new_v4());
        assert_eq!(err.error_code(), "DOCUMENT_NOT_FOUND");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = WorkflowError::SelfApprovalNotAllowed;
        assert_eq!(err.error_code(), "SELF_APPROVAL_NOT_ALLOWED");
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn unmet_dependencies_carry_details() {
        let err = WorkflowError::DependenciesUnmet {
            unmet: vec!["requires completed inventory_controller task".to_string()],
        };
        let details = err.details().unwrap();
        assert_eq!(details.get("unmet").unwrap().len(), 1);
    }

    #[test]
    fn missing_criteria_message_lists_names() {
        let err = WorkflowError::MissingCriteria {
            missing: vec![Criterion::Finished, Criterion::PhotoProof],
        };
        assert!(err.message().contains("finished"));
        assert!(err.message().contains("photo_proof"));
    }
}
