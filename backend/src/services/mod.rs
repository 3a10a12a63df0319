pub mod documents;
pub mod payments;
pub mod roles;
pub mod sync;
pub mod tasks;
pub mod templates;

pub use documents::{CancellationSummary, DocumentService, NewDocument};
pub use payments::PaymentService;
pub use roles::{NewRoleAssignment, RoleService};
pub use sync::{BulkSyncReport, SyncOutcome, SyncService};
pub use tasks::{CompletionOutcome, DependencyStatus, TaskService, TaskView};
pub use templates::{DocumentTemplate, RoleTemplate, TaskDependency, TemplateRegistry};
