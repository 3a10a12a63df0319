//! Role templates: which tasks a document type spawns, what each role
//! must produce, and what gates its completion.

use payflow_shared::{ArtifactFlag, CriteriaSet, Criterion, DocumentType, Priority, Role};
use std::collections::HashMap;

/// A gate that must hold before the templated task may complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDependency {
    /// The named artifact flag must be set on the document.
    Artifact(ArtifactFlag),
    /// The task held by the named role must already be completed.
    Predecessor(Role),
}

impl TaskDependency {
    pub fn describe(&self) -> String {
        match self {
            TaskDependency::Artifact(flag) => format!("requires document artifact '{}'", flag),
            TaskDependency::Predecessor(role) => {
                format!("requires completed {} task", role)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoleTemplate {
    pub role: Role,
    pub required_criteria: CriteriaSet,
    pub deadline_hours: i64,
    pub priority: Priority,
    pub dependencies: Vec<TaskDependency>,
    /// Completing the terminal role's task closes out the document and
    /// opens its payment schedule entry.
    pub terminal: bool,
}

#[derive(Debug, Clone)]
pub struct DocumentTemplate {
    pub document_type: DocumentType,
    pub roles: Vec<RoleTemplate>,
}

pub struct TemplateRegistry {
    templates: HashMap<DocumentType, DocumentTemplate>,
}

impl TemplateRegistry {
    /// The standard vendor receiving flow.
    pub fn standard() -> Self {
        let vendor_receiving = DocumentTemplate {
            document_type: DocumentType::VendorReceiving,
            roles: vec![
                RoleTemplate {
                    role: Role::BranchManager,
                    required_criteria: CriteriaSet::of(&[Criterion::Finished]),
                    deadline_hours: 24,
                    priority: Priority::High,
                    dependencies: vec![],
                    terminal: false,
                },
                RoleTemplate {
                    role: Role::InventoryController,
                    required_criteria: CriteriaSet::of(&[Criterion::Finished, Criterion::PhotoProof]),
                    deadline_hours: 48,
                    priority: Priority::Medium,
                    dependencies: vec![],
                    terminal: false,
                },
                RoleTemplate {
                    role: Role::PurchaseManager,
                    required_criteria: CriteriaSet::of(&[Criterion::Finished]),
                    deadline_hours: 72,
                    priority: Priority::Medium,
                    dependencies: vec![TaskDependency::Artifact(ArtifactFlag::CostSheetUploaded)],
                    terminal: false,
                },
                RoleTemplate {
                    role: Role::Accountant,
                    required_criteria: CriteriaSet::of(&[
                        Criterion::Finished,
                        Criterion::ExternalReference,
                    ]),
                    deadline_hours: 96,
                    priority: Priority::Medium,
                    dependencies: vec![
                        TaskDependency::Artifact(ArtifactFlag::PurchaseInvoiceCaptured),
                        TaskDependency::Predecessor(Role::InventoryController),
                    ],
                    terminal: true,
                },
            ],
        };

        let mut templates = HashMap::new();
        templates.insert(DocumentType::VendorReceiving, vendor_receiving);
        Self { templates }
    }

    pub fn for_document_type(&self, document_type: DocumentType) -> Option<&DocumentTemplate> {
        self.templates.get(&document_type)
    }
}

impl DocumentTemplate {
    pub fn role_template(&self, role: Role) -> Option<&RoleTemplate> {
        self.roles.iter().find(|t| t.role == role)
    }

    pub fn terminal_role(&self) -> Option<Role> {
        self.roles.iter().find(|t| t.terminal).map(|t| t.role)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_vendor_receiving() {
        let registry = TemplateRegistry::standard();
        let template = registry
            .for_document_type(DocumentType::VendorReceiving)
            .unwrap();
        assert_eq!(template.roles.len(), 4);
        assert_eq!(template.terminal_role(), Some(Role::Accountant));
    }

    #[test]
    fn accountant_gated_on_artifact_and_predecessor() {
        let registry = TemplateRegistry::standard();
        let template = registry
            .for_document_type(DocumentType::VendorReceiving)
            .unwrap();
        let accountant = template.role_template(Role::Accountant).unwrap();
        assert!(accountant
            .dependencies
            .contains(&TaskDependency::Artifact(ArtifactFlag::PurchaseInvoiceCaptured)));
        assert!(accountant
            .dependencies
            .contains(&TaskDependency::Predecessor(Role::InventoryController)));
        assert!(accountant.required_criteria.contains(Criterion::ExternalReference));
    }

    #[test]
    fn only_purchase_manager_waits_on_cost_sheet() {
        let registry = TemplateRegistry::standard();
        let template = registry
            .for_document_type(DocumentType::VendorReceiving)
            .unwrap();
        let pm = template.role_template(Role::PurchaseManager).unwrap();
        assert_eq!(
            pm.dependencies,
            vec![TaskDependency::Artifact(ArtifactFlag::CostSheetUploaded)]
        );
        let bm = template.role_template(Role::BranchManager).unwrap();
        assert!(bm.dependencies.is_empty());
    }
}
