use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Returned when a stored string does not map to a known enum value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} value '{}'", self.kind, self.value)
    }
}

impl std::error::Error for UnknownValue {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    BranchManager,
    InventoryController,
    PurchaseManager,
    Accountant,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::BranchManager,
        Role::InventoryController,
        Role::PurchaseManager,
        Role::Accountant,
        Role::Administrator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::BranchManager => "branch_manager",
            Role::InventoryController => "inventory_controller",
            Role::PurchaseManager => "purchase_manager",
            Role::Accountant => "accountant",
            Role::Administrator => "administrator",
        }
    }

    /// Role notified when a task held by this role is escalated.
    pub fn supervisor(&self) -> Option<Role> {
        match self {
            Role::InventoryController => Some(Role::BranchManager),
            Role::Accountant => Some(Role::PurchaseManager),
            Role::BranchManager | Role::PurchaseManager => Some(Role::Administrator),
            Role::Administrator => None,
        }
    }

    pub fn can_approve_payments(&self) -> bool {
        matches!(self, Role::PurchaseManager | Role::Administrator)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "branch_manager" => Ok(Role::BranchManager),
            "inventory_controller" => Ok(Role::InventoryController),
            "purchase_manager" => Ok(Role::PurchaseManager),
            "accountant" => Ok(Role::Accountant),
            "administrator" => Ok(Role::Administrator),
            other => Err(UnknownValue { kind: "role", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled tasks accept no further transitions.
    pub fn is_final(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Cancelled)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(TaskStatus::Open),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(UnknownValue { kind: "task status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Requested,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Requested => "requested",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    /// Approved entries are immutable; rejected entries may be reopened.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ApprovalStatus::Approved)
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "requested" => Ok(ApprovalStatus::Requested),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(UnknownValue { kind: "approval status", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }

    /// One level up; critical stays critical.
    pub fn raised(&self) -> Priority {
        match self {
            Priority::Low => Priority::Medium,
            Priority::Medium => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(UnknownValue { kind: "priority", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    VendorReceiving,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::VendorReceiving => "vendor_receiving",
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vendor_receiving" => Ok(DocumentType::VendorReceiving),
            other => Err(UnknownValue { kind: "document type", value: other.to_string() }),
        }
    }
}

/// Upload/capture flags tracked on a receiving document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactFlag {
    PurchaseInvoiceCaptured,
    CostSheetUploaded,
    OriginalBillUploaded,
}

impl ArtifactFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFlag::PurchaseInvoiceCaptured => "purchase_invoice_captured",
            ArtifactFlag::CostSheetUploaded => "cost_sheet_uploaded",
            ArtifactFlag::OriginalBillUploaded => "original_bill_uploaded",
        }
    }
}

impl fmt::Display for ArtifactFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFlag {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purchase_invoice_captured" => Ok(ArtifactFlag::PurchaseInvoiceCaptured),
            "cost_sheet_uploaded" => Ok(ArtifactFlag::CostSheetUploaded),
            "original_bill_uploaded" => Ok(ArtifactFlag::OriginalBillUploaded),
            other => Err(UnknownValue { kind: "artifact flag", value: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFlags {
    pub purchase_invoice_captured: bool,
    pub cost_sheet_uploaded: bool,
    pub original_bill_uploaded: bool,
}

impl ArtifactFlags {
    pub fn get(&self, flag: ArtifactFlag) -> bool {
        match flag {
            ArtifactFlag::PurchaseInvoiceCaptured => self.purchase_invoice_captured,
            ArtifactFlag::CostSheetUploaded => self.cost_sheet_uploaded,
            ArtifactFlag::OriginalBillUploaded => self.original_bill_uploaded,
        }
    }

    pub fn set(&mut self, flag: ArtifactFlag, value: bool) {
        match flag {
            ArtifactFlag::PurchaseInvoiceCaptured => self.purchase_invoice_captured = value,
            ArtifactFlag::CostSheetUploaded => self.cost_sheet_uploaded = value,
            ArtifactFlag::OriginalBillUploaded => self.original_bill_uploaded = value,
        }
    }
}

/// A single completion requirement on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Finished,
    PhotoProof,
    ExternalReference,
}

impl Criterion {
    pub const ALL: [Criterion; 3] =
        [Criterion::Finished, Criterion::PhotoProof, Criterion::ExternalReference];

    fn bit(&self) -> u8 {
        match self {
            Criterion::Finished => 0b001,
            Criterion::PhotoProof => 0b010,
            Criterion::ExternalReference => 0b100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Finished => "finished",
            Criterion::PhotoProof => "photo_proof",
            Criterion::ExternalReference => "external_reference",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of completion criteria, stored as a bitmask so precondition
/// checks are total over the three known criteria.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CriteriaSet(u8);

impl CriteriaSet {
    pub fn empty() -> Self {
        CriteriaSet(0)
    }

    pub fn of(criteria: &[Criterion]) -> Self {
        let mut set = CriteriaSet::empty();
        for c in criteria {
            set.insert(*c);
        }
        set
    }

    pub fn insert(&mut self, criterion: Criterion) {
        self.0 |= criterion.bit();
    }

    pub fn contains(&self, criterion: Criterion) -> bool {
        self.0 & criterion.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Criterion> + '_ {
        Criterion::ALL.iter().copied().filter(|c| self.contains(*c))
    }

    /// Criteria required here but absent from `satisfied`.
    pub fn missing_from(&self, satisfied: CriteriaSet) -> Vec<Criterion> {
        self.iter().filter(|c| !satisfied.contains(*c)).collect()
    }

    pub fn bits(&self) -> i16 {
        self.0 as i16
    }

    pub fn from_bits(bits: i16) -> Self {
        CriteriaSet((bits as u8) & 0b111)
    }
}

impl Serialize for CriteriaSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CriteriaSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let criteria = Vec::<Criterion>::deserialize(deserializer)?;
        Ok(CriteriaSet::of(&criteria))
    }
}

/// Vendor receiving record that triggers the task workflow. Never
/// deleted; cancellation is recorded as a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: Uuid,
    pub branch_id: Uuid,
    pub vendor_id: Uuid,
    pub document_type: DocumentType,
    pub gross_amount: Decimal,
    pub net_amount: Decimal,
    pub artifacts: ArtifactFlags,
    pub external_reference: Option<String>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SourceDocument {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled_at.is_some()
    }
}

/// Provenance of a single ownership change; the history is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReassignmentRecord {
    pub from_user: Option<Uuid>,
    pub to_user: Uuid,
    pub by_user: Uuid,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub document_id: Uuid,
    pub role: Role,
    // Denormalized from the document so role checks need no join.
    pub branch_id: Uuid,
    pub assigned_to: Option<Uuid>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub required_criteria: CriteriaSet,
    pub escalated_at: Option<DateTime<Utc>>,
    pub reassignments: Vec<ReassignmentRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_overdue(&self, as_of: DateTime<Utc>) -> bool {
        !self.status.is_final() && self.deadline < as_of
    }
}

/// Evidence submitted with a completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompletionEvidence {
    pub finished: bool,
    pub proof_url: Option<String>,
    pub external_reference: Option<String>,
    pub notes: Option<String>,
}

impl CompletionEvidence {
    pub fn satisfies(&self, criterion: Criterion) -> bool {
        match criterion {
            Criterion::Finished => self.finished,
            Criterion::PhotoProof => {
                self.proof_url.as_deref().is_some_and(|u| !u.trim().is_empty())
            }
            Criterion::ExternalReference => self
                .external_reference
                .as_deref()
                .is_some_and(|r| !r.trim().is_empty()),
        }
    }

    pub fn satisfied_set(&self) -> CriteriaSet {
        let mut set = CriteriaSet::empty();
        for c in Criterion::ALL {
            if self.satisfies(c) {
                set.insert(c);
            }
        }
        set
    }
}

/// Written exactly once when a task transitions to completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompletion {
    pub id: Uuid,
    pub task_id: Uuid,
    pub completed_by: Uuid,
    pub completed_at: DateTime<Utc>,
    pub satisfied: CriteriaSet,
    pub proof_url: Option<String>,
    pub external_reference: Option<String>,
    pub notes: Option<String>,
}

/// The three independently tracked deduction types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deductions {
    pub shortage: Decimal,
    pub damage: Decimal,
    pub adjustment: Decimal,
}

impl Deductions {
    pub fn total(&self) -> Decimal {
        self.shortage + self.damage + self.adjustment
    }
}

/// Payable derived from a completed receiving document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentScheduleEntry {
    pub id: Uuid,
    pub document_id: Uuid,
    pub base_amount: Decimal,
    pub deductions: Deductions,
    pub final_amount: Decimal,
    pub approval_status: ApprovalStatus,
    pub external_reference: Option<String>,
    pub requested_by: Option<Uuid>,
    pub requested_at: Option<DateTime<Utc>>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl PaymentScheduleEntry {
    /// Fresh pending entry with no deductions.
    pub fn draft(document_id: Uuid, base_amount: Decimal, now: DateTime<Utc>) -> Self {
        PaymentScheduleEntry {
            id: Uuid::new_v4(),
            document_id,
            base_amount,
            deductions: Deductions::default(),
            final_amount: base_amount,
            approval_status: ApprovalStatus::Pending,
            external_reference: None,
            requested_by: None,
            requested_at: None,
            decided_by: None,
            decided_at: None,
            decision_notes: None,
            created_at: now,
            updated_at: None,
        }
    }

    /// Invariant: final_amount = base_amount - sum of deductions.
    pub fn amounts_consistent(&self) -> bool {
        self.final_amount == self.base_amount - self.deductions.total()
    }
}

/// Employee-to-role mapping, effective-dated. Owned by the HR system
/// and consumed read-only by the resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: Role,
    pub branch_id: Uuid,
    pub effective_from: DateTime<Utc>,
    pub superseded_at: Option<DateTime<Utc>>,
}

impl RoleAssignment {
    pub fn is_current_at(&self, as_of: DateTime<Utc>) -> bool {
        self.effective_from <= as_of
            && self.superseded_at.map_or(true, |ended| ended > as_of)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_set_round_trips_bits() {
        let set = CriteriaSet::of(&[Criterion::Finished, Criterion::ExternalReference]);
        assert!(set.contains(Criterion::Finished));
        assert!(!set.contains(Criterion::PhotoProof));
        assert_eq!(CriteriaSet::from_bits(set.bits()), set);
    }

    #[test]
    fn criteria_set_missing_from() {
        let required = CriteriaSet::of(&[Criterion::Finished, Criterion::PhotoProof]);
        let satisfied = CriteriaSet::of(&[Criterion::Finished]);
        assert_eq!(required.missing_from(satisfied), vec![Criterion::PhotoProof]);
        assert!(required.missing_from(required).is_empty());
    }

    #[test]
    fn evidence_ignores_blank_strings() {
        let evidence = CompletionEvidence {
            finished: true,
            proof_url: Some("  ".to_string()),
            external_reference: Some("INV-77".to_string()),
            notes: None,
        };
        assert!(evidence.satisfies(Criterion::Finished));
        assert!(!evidence.satisfies(Criterion::PhotoProof));
        assert!(evidence.satisfies(Criterion::ExternalReference));
    }

    #[test]
    fn priority_raised_saturates_at_critical() {
        assert_eq!(Priority::Low.raised(), Priority::Medium);
        assert_eq!(Priority::High.raised(), Priority::Critical);
        assert_eq!(Priority::Critical.raised(), Priority::Critical);
    }

    #[test]
    fn payment_entry_draft_is_consistent() {
        let entry = PaymentScheduleEntry::draft(Uuid::new_v4(), Decimal::new(125000, 2), Utc::now());
        assert!(entry.amounts_consistent());
        assert_eq!(entry.approval_status, ApprovalStatus::Pending);
    }

    #[test]
    fn role_assignment_effective_window() {
        let now = Utc::now();
        let assignment = RoleAssignment {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            role: Role::Accountant,
            branch_id: Uuid::new_v4(),
            effective_from: now - chrono::Duration::days(30),
            superseded_at: Some(now - chrono::Duration::days(1)),
        };
        assert!(assignment.is_current_at(now - chrono::Duration::days(2)));
        assert!(!assignment.is_current_at(now));
    }

    #[test]
    fn status_enums_parse_their_own_strings() {
        for status in [TaskStatus::Open, TaskStatus::InProgress, TaskStatus::Completed, TaskStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        for status in [ApprovalStatus::Pending, ApprovalStatus::Requested, ApprovalStatus::Approved, ApprovalStatus::Rejected] {
            assert_eq!(status.as_str().parse::<ApprovalStatus>().unwrap(), status);
        }
        assert!("paid".parse::<ApprovalStatus>().is_err());
    }
}
