//! Error types for assignment operations.

use crate::catalog::CatalogError;
use crate::ledger::LedgerError;
use crate::model::AssignmentState;
use fleet_cost::PolicyError;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

pub type AssignmentResult<T> = Result<T, AssignmentError>;

/// One rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Field-level validation failures collected over a whole request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|error| error.field == field)
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }

    pub fn into_result(self) -> AssignmentResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AssignmentError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    #[error("equipment {equipment_id} is already assigned (active assignment {active_id})")]
    EquipmentAlreadyAssigned { equipment_id: String, active_id: Uuid },

    #[error("assignment {id} is {state} and cannot be modified")]
    InvalidState { id: Uuid, state: AssignmentState },

    #[error("assignment {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: AssignmentState,
        to: AssignmentState,
    },

    #[error("assignment {id} was changed concurrently and is now {state}")]
    ConcurrentModification { id: Uuid, state: AssignmentState },

    #[error("assignment {0} not found")]
    NotFound(Uuid),

    #[error("project {0} not found")]
    ProjectNotFound(String),

    #[error("retribution policy failed: {0}")]
    Policy(#[from] PolicyError),

    #[error("storage failure: {0}")]
    Storage(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

impl AssignmentError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        AssignmentError::Validation(ValidationErrors::single(field, message))
    }
}

impl From<ValidationErrors> for AssignmentError {
    fn from(value: ValidationErrors) -> Self {
        AssignmentError::Validation(value)
    }
}

impl From<LedgerError> for AssignmentError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::EquipmentBusy {
                equipment_id,
                active_id,
            } => AssignmentError::EquipmentAlreadyAssigned {
                equipment_id,
                active_id,
            },
            LedgerError::NotFound(id) => AssignmentError::NotFound(id),
            LedgerError::Stale { id, state } => {
                AssignmentError::ConcurrentModification { id, state }
            }
            LedgerError::DuplicateId(id) => {
                AssignmentError::validation("id", format!("assignment {id} already exists"))
            }
            other => AssignmentError::Storage(other.to_string()),
        }
    }
}
