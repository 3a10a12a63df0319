//! Shared fixtures: an in-memory workflow stack with one branch and one
//! user per role.

use chrono::{Duration, Utc};
use payflow_shared::{DocumentType, Role, SourceDocument};
use rust_decimal::Decimal;
use std::sync::{Arc, Once};
use uuid::Uuid;

use payflow_backend::AppState;
use payflow_backend::notifications::{BufferNotifier, NotificationSink};
use payflow_backend::services::{NewDocument, NewRoleAssignment};
use payflow_backend::store::{MemoryStore, WorkflowStore};

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// One user per workflow role at a single branch.
pub struct Crew {
    pub branch_id: Uuid,
    pub branch_manager: Uuid,
    pub inventory: Uuid,
    pub purchase: Uuid,
    pub accountant: Uuid,
    pub admin: Uuid,
    /// Holds no role anywhere.
    pub outsider: Uuid,
}

pub struct Harness {
    pub state: AppState,
    pub store: Arc<dyn WorkflowStore>,
    pub notifier: Arc<BufferNotifier>,
    pub crew: Crew,
}

pub async fn harness() -> Harness {
    init_tracing();

    let store = Arc::new(MemoryStore::new());
    let notifier = Arc::new(BufferNotifier::new());
    let store_dyn: Arc<dyn WorkflowStore> = store.clone();
    let notifier_dyn: Arc<dyn NotificationSink> = notifier.clone();
    let state = AppState::new(store_dyn.clone(), notifier_dyn);

    let crew = Crew {
        branch_id: Uuid::new_v4(),
        branch_manager: Uuid::new_v4(),
        inventory: Uuid::new_v4(),
        purchase: Uuid::new_v4(),
        accountant: Uuid::new_v4(),
        admin: Uuid::new_v4(),
        outsider: Uuid::new_v4(),
    };

    let effective = Utc::now() - Duration::days(30);
    for (user_id, role) in [
        (crew.branch_manager, Role::BranchManager),
        (crew.inventory, Role::InventoryController),
        (crew.purchase, Role::PurchaseManager),
        (crew.accountant, Role::Accountant),
        (crew.admin, Role::Administrator),
    ] {
        state
            .roles
            .ingest(NewRoleAssignment {
                user_id,
                role,
                branch_id: crew.branch_id,
                effective_from: effective,
                superseded_at: None,
            })
            .await
            .expect("seed role assignment");
    }

    Harness { state, store: store_dyn, notifier, crew }
}

impl Harness {
    pub async fn receiving_document(&self, net: Decimal) -> SourceDocument {
        self.state
            .documents
            .create(NewDocument {
                branch_id: self.crew.branch_id,
                vendor_id: Uuid::new_v4(),
                document_type: DocumentType::VendorReceiving,
                gross_amount: net + Decimal::new(10000, 2),
                net_amount: net,
            })
            .await
            .expect("create document")
    }
}
