use crate::model::{Assignment, AssignmentFilter, AssignmentState};
use uuid::Uuid;

mod memory;

pub use memory::InMemoryLedger;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("equipment {equipment_id} already has active assignment {active_id}")]
    EquipmentBusy { equipment_id: String, active_id: Uuid },

    #[error("idempotency key already used by assignment {existing_id}")]
    DuplicateIdempotencyKey { existing_id: Uuid },

    #[error("assignment {0} already exists")]
    DuplicateId(Uuid),

    #[error("assignment {0} not found")]
    NotFound(Uuid),

    #[error("assignment {id} changed since it was read (now {state})")]
    Stale { id: Uuid, state: AssignmentState },

    #[error("ledger storage error: {0}")]
    Storage(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage contract for assignment records.
///
/// `insert` and `update` must check the one-active-assignment-per-equipment
/// rule and write the record as a single atomic step: two concurrent writers
/// activating the same equipment can never both succeed.
pub trait AssignmentLedger: Send + Sync {
    fn find_active_by_equipment(&self, equipment_id: &str) -> LedgerResult<Option<Assignment>>;

    fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Assignment>>;

    /// Fails with `EquipmentBusy` when the record is active and its equipment
    /// already has an active assignment, and with `DuplicateIdempotencyKey`
    /// when its key is taken.
    fn insert(&self, assignment: &Assignment) -> LedgerResult<Uuid>;

    /// Replaces the stored record with `assignment`, but only while the stored
    /// record still equals `expected`; otherwise fails with `Stale`.
    /// Activating a record whose equipment is held by another active
    /// assignment fails with `EquipmentBusy`.
    fn update(&self, expected: &Assignment, assignment: &Assignment) -> LedgerResult<()>;

    fn get(&self, id: Uuid) -> LedgerResult<Option<Assignment>>;

    /// Matching records ordered by creation time, then id.
    fn list(&self, filter: &AssignmentFilter) -> LedgerResult<Vec<Assignment>>;

    fn delete(&self, id: Uuid) -> LedgerResult<bool>;
}

pub(crate) fn sort_for_listing(assignments: &mut [Assignment]) {
    assignments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
