use super::{AssignmentLedger, LedgerError, LedgerResult, sort_for_listing};
use crate::model::{Assignment, AssignmentFilter, AssignmentState};
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

/// Process-local ledger. Every write runs under one write lock, which makes
/// the exclusivity check and the write a single step.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: RwLock<HashMap<Uuid, Assignment>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

fn active_holder<'a>(
    records: &'a HashMap<Uuid, Assignment>,
    equipment_id: &str,
    except: Option<Uuid>,
) -> Option<&'a Assignment> {
    records.values().find(|record| {
        record.state == AssignmentState::Active
            && record.equipment_id == equipment_id
            && Some(record.id) != except
    })
}

impl AssignmentLedger for InMemoryLedger {
    fn find_active_by_equipment(&self, equipment_id: &str) -> LedgerResult<Option<Assignment>> {
        let guard = self.records.read();
        Ok(active_holder(&guard, equipment_id, None).cloned())
    }

    fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Assignment>> {
        let guard = self.records.read();
        Ok(guard
            .values()
            .find(|record| record.idempotency_key.as_deref() == Some(key))
            .cloned())
    }

    fn insert(&self, assignment: &Assignment) -> LedgerResult<Uuid> {
        let mut guard = self.records.write();
        if guard.contains_key(&assignment.id) {
            return Err(LedgerError::DuplicateId(assignment.id));
        }
        if let Some(key) = assignment.idempotency_key.as_deref() {
            if let Some(existing) = guard
                .values()
                .find(|record| record.idempotency_key.as_deref() == Some(key))
            {
                return Err(LedgerError::DuplicateIdempotencyKey {
                    existing_id: existing.id,
                });
            }
        }
        if assignment.state == AssignmentState::Active {
            if let Some(holder) = active_holder(&guard, &assignment.equipment_id, None) {
                return Err(LedgerError::EquipmentBusy {
                    equipment_id: assignment.equipment_id.clone(),
                    active_id: holder.id,
                });
            }
        }
        guard.insert(assignment.id, assignment.clone());
        Ok(assignment.id)
    }

    fn update(&self, expected: &Assignment, assignment: &Assignment) -> LedgerResult<()> {
        let id = expected.id;
        let mut guard = self.records.write();
        match guard.get(&id) {
            None => return Err(LedgerError::NotFound(id)),
            Some(stored) if stored != expected => {
                return Err(LedgerError::Stale {
                    id,
                    state: stored.state,
                });
            }
            Some(_) => {}
        }
        if assignment.state == AssignmentState::Active {
            if let Some(holder) = active_holder(&guard, &assignment.equipment_id, Some(id)) {
                return Err(LedgerError::EquipmentBusy {
                    equipment_id: assignment.equipment_id.clone(),
                    active_id: holder.id,
                });
            }
        }
        let mut record = assignment.clone();
        record.id = id;
        guard.insert(id, record);
        Ok(())
    }

    fn get(&self, id: Uuid) -> LedgerResult<Option<Assignment>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn list(&self, filter: &AssignmentFilter) -> LedgerResult<Vec<Assignment>> {
        let mut matching: Vec<Assignment> = self
            .records
            .read()
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect();
        sort_for_listing(&mut matching);
        Ok(matching)
    }

    fn delete(&self, id: Uuid) -> LedgerResult<bool> {
        Ok(self.records.write().remove(&id).is_some())
    }
}
