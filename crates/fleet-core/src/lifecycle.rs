//! Assignment lifecycle: creation, term updates, state transitions and the
//! administrative import/purge paths.
//!
//! The controller holds no state of its own. Every operation takes the
//! current time explicitly, and every write goes through the ledger, which
//! enforces the one-active-assignment-per-equipment rule atomically.

use crate::assignment_validation::{
    check_actual_end, check_expected_end, check_hours, check_retribution, required_text,
};
use crate::catalog::{EquipmentDirectory, ProjectCatalog};
use crate::error::{AssignmentError, AssignmentResult, ValidationErrors};
use crate::ledger::{AssignmentLedger, LedgerError};
use crate::model::{Assignment, AssignmentFilter, AssignmentState, OperationalStatus, Project};
use chrono::{DateTime, NaiveDate, Utc};
use fleet_cost::{Retribution, RetributionDefaults, RetributionMode, compute_cost, round_currency};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Input for a new assignment. Every field is optional on the wire so that
/// missing values are reported per field rather than as a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssignment {
    pub equipment_id: Option<String>,
    pub project_id: Option<String>,
    pub cost_center_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub expected_end_date: Option<NaiveDate>,
    /// Pre-filled from the project kind's default when absent.
    pub retribution_mode: Option<RetributionMode>,
    /// Pre-filled from the mode's default when absent.
    pub retribution_value: Option<Decimal>,
    /// Defaults to zero.
    pub estimated_hours: Option<Decimal>,
    pub notes: Option<String>,
    pub created_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Partial update of an open assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermsPatch {
    pub expected_end_date: Option<NaiveDate>,
    pub retribution_mode: Option<RetributionMode>,
    pub retribution_value: Option<Decimal>,
    pub estimated_hours: Option<Decimal>,
    pub actual_hours: Option<Decimal>,
    pub notes: Option<String>,
    /// Can only move from false to true.
    pub maintenance_validated: Option<bool>,
    /// Accepted for compatibility with older clients and ignored: cost is
    /// always recomputed.
    #[serde(default, skip_serializing)]
    pub total_cost: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub target_state: AssignmentState,
    /// Only meaningful when finalizing; defaults to today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,
}

impl TransitionRequest {
    pub fn to(target_state: AssignmentState) -> Self {
        Self {
            target_state,
            actual_end_date: None,
        }
    }

    pub fn finalize_on(actual_end_date: NaiveDate) -> Self {
        Self {
            target_state: AssignmentState::Finalized,
            actual_end_date: Some(actual_end_date),
        }
    }
}

/// A historical or migrated record entering through the administrative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub assignment: NewAssignment,
    pub state: AssignmentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_hours: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub maintenance_validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Validated inputs shared by `create` and `import`.
struct Draft {
    equipment_id: String,
    project: Project,
    cost_center_id: String,
    start_date: NaiveDate,
    expected_end_date: Option<NaiveDate>,
    retribution: Retribution,
    estimated_hours: Decimal,
}

#[derive(Clone)]
pub struct AssignmentController {
    ledger: Arc<dyn AssignmentLedger>,
    projects: Arc<dyn ProjectCatalog>,
    equipment: Arc<dyn EquipmentDirectory>,
    defaults: RetributionDefaults,
}

impl AssignmentController {
    pub fn new(
        ledger: Arc<dyn AssignmentLedger>,
        projects: Arc<dyn ProjectCatalog>,
        equipment: Arc<dyn EquipmentDirectory>,
    ) -> Self {
        Self {
            ledger,
            projects,
            equipment,
            defaults: RetributionDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: RetributionDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &RetributionDefaults {
        &self.defaults
    }

    pub fn create(&self, input: NewAssignment, now: DateTime<Utc>) -> AssignmentResult<Assignment> {
        if let Some(existing) = self.replay(input.idempotency_key.as_deref())? {
            return Ok(existing);
        }

        let mut errors = ValidationErrors::default();
        let draft = self.prepare(&input, true, &mut errors)?;
        let draft = match draft {
            Some(draft) if errors.is_empty() => draft,
            _ => return Err(errors.into()),
        };
        self.ensure_equipment_free(&draft.equipment_id, None)?;

        let total_cost = self.price(&draft.retribution, draft.estimated_hours, &draft.project)?;
        let assignment = Assignment {
            id: Uuid::new_v4(),
            equipment_id: draft.equipment_id,
            project_id: draft.project.id,
            cost_center_id: draft.cost_center_id,
            start_date: draft.start_date,
            expected_end_date: draft.expected_end_date,
            actual_end_date: None,
            retribution: draft.retribution,
            estimated_hours: draft.estimated_hours,
            actual_hours: Decimal::ZERO,
            total_cost,
            state: AssignmentState::Active,
            maintenance_validated: false,
            created_by: clean_text(input.created_by),
            created_at: now,
            updated_at: now,
            notes: clean_text(input.notes),
            idempotency_key: clean_text(input.idempotency_key),
        };
        let created = self.persist_new(assignment)?;
        info!(
            assignment_id = %created.id,
            equipment_id = %created.equipment_id,
            project_id = %created.project_id,
            total_cost = %created.total_cost,
            "assignment created"
        );
        Ok(created)
    }

    pub fn update_terms(
        &self,
        id: Uuid,
        patch: TermsPatch,
        now: DateTime<Utc>,
    ) -> AssignmentResult<Assignment> {
        let current = self.get(id)?;
        let mut record = current.clone();
        if record.is_terminal() {
            return Err(AssignmentError::InvalidState {
                id,
                state: record.state,
            });
        }
        if let Some(client_cost) = patch.total_cost {
            debug!(assignment_id = %id, %client_cost, "ignoring client-supplied total cost");
        }

        let project = self.project_for_record(&record)?;
        let mut errors = ValidationErrors::default();

        let current_mode = record.retribution.mode();
        let mode = patch.retribution_mode.unwrap_or(current_mode);
        let value = match patch.retribution_value {
            Some(value) => value,
            None if mode == current_mode => record.retribution.value(),
            None => self.defaults.value_for(mode),
        };
        let retribution = Retribution::from_parts(mode, value);
        check_retribution(&mut errors, &retribution, &project.pricing());

        let expected_end_date = patch.expected_end_date.or(record.expected_end_date);
        check_expected_end(&mut errors, record.start_date, expected_end_date);

        let estimated_hours = patch.estimated_hours.unwrap_or(record.estimated_hours);
        let actual_hours = patch.actual_hours.unwrap_or(record.actual_hours);
        check_hours(&mut errors, "estimatedHours", estimated_hours);
        check_hours(&mut errors, "actualHours", actual_hours);

        if patch.maintenance_validated == Some(false) && record.maintenance_validated {
            errors.push(
                "maintenanceValidated",
                "cannot be reset once maintenance has been validated",
            );
        }
        errors.into_result()?;

        record.retribution = retribution;
        record.expected_end_date = expected_end_date;
        record.estimated_hours = estimated_hours;
        record.actual_hours = actual_hours;
        if patch.maintenance_validated == Some(true) {
            record.maintenance_validated = true;
        }
        if let Some(notes) = patch.notes {
            record.notes = clean_text(Some(notes));
        }
        record.total_cost = self.price(&record.retribution, record.billing_hours(), &project)?;
        record.updated_at = now;

        self.ledger.update(&current, &record)?;
        info!(
            assignment_id = %id,
            total_cost = %record.total_cost,
            billing_hours = %record.billing_hours(),
            "assignment terms updated"
        );
        Ok(record)
    }

    pub fn transition(
        &self,
        id: Uuid,
        request: TransitionRequest,
        now: DateTime<Utc>,
    ) -> AssignmentResult<Assignment> {
        let current = self.get(id)?;
        let mut record = current.clone();
        let from = record.state;
        let to = request.target_state;
        if !from.can_transition_to(to) {
            return Err(AssignmentError::InvalidTransition { id, from, to });
        }

        match to {
            AssignmentState::Finalized => {
                let end = request.actual_end_date.unwrap_or_else(|| now.date_naive());
                let mut errors = ValidationErrors::default();
                check_actual_end(&mut errors, to, record.start_date, Some(end));
                errors.into_result()?;
                record.actual_end_date = Some(end);
            }
            _ if request.actual_end_date.is_some() => {
                return Err(AssignmentError::validation(
                    "actualEndDate",
                    format!("is only accepted when finalizing (target is {to})"),
                ));
            }
            AssignmentState::Active => {
                let mut errors = ValidationErrors::default();
                self.check_equipment(&mut errors, &record.equipment_id, true)?;
                errors.into_result()?;
                self.ensure_equipment_free(&record.equipment_id, Some(id))?;
            }
            AssignmentState::Suspended | AssignmentState::Cancelled => {}
        }

        record.state = to;
        record.updated_at = now;
        self.ledger.update(&current, &record)?;
        info!(assignment_id = %id, %from, %to, "assignment state changed");
        Ok(record)
    }

    pub fn get(&self, id: Uuid) -> AssignmentResult<Assignment> {
        debug!(assignment_id = %id, "loading assignment");
        self.ledger.get(id)?.ok_or(AssignmentError::NotFound(id))
    }

    pub fn list(&self, filter: &AssignmentFilter) -> AssignmentResult<Vec<Assignment>> {
        debug!(?filter, "listing assignments");
        Ok(self.ledger.list(filter)?)
    }

    /// Terms a new assignment form for this project should start from.
    pub fn suggest_terms(&self, project_id: &str) -> AssignmentResult<Retribution> {
        let project = self
            .projects
            .project(project_id)?
            .ok_or_else(|| AssignmentError::ProjectNotFound(project_id.to_string()))?;
        Ok(self.defaults.suggest(project.kind))
    }

    /// Administrative import. Accepts any initial state; exclusivity only
    /// applies when the imported record is active.
    pub fn import(&self, record: ImportRecord, now: DateTime<Utc>) -> AssignmentResult<Assignment> {
        if let Some(existing) = self.replay(record.assignment.idempotency_key.as_deref())? {
            return Ok(existing);
        }

        let state = record.state;
        let mut errors = ValidationErrors::default();
        let draft = self.prepare(
            &record.assignment,
            state == AssignmentState::Active,
            &mut errors,
        )?;
        let actual_hours = record.actual_hours.unwrap_or(Decimal::ZERO);
        check_hours(&mut errors, "actualHours", actual_hours);
        if let Some(start) = record.assignment.start_date {
            check_actual_end(&mut errors, state, start, record.actual_end_date);
        }
        let draft = match draft {
            Some(draft) if errors.is_empty() => draft,
            _ => return Err(errors.into()),
        };
        if state == AssignmentState::Active {
            self.ensure_equipment_free(&draft.equipment_id, None)?;
        }

        let billing_hours = actual_hours.max(draft.estimated_hours);
        let total_cost = self.price(&draft.retribution, billing_hours, &draft.project)?;
        let assignment = Assignment {
            id: record.id.unwrap_or_else(Uuid::new_v4),
            equipment_id: draft.equipment_id,
            project_id: draft.project.id,
            cost_center_id: draft.cost_center_id,
            start_date: draft.start_date,
            expected_end_date: draft.expected_end_date,
            actual_end_date: record.actual_end_date,
            retribution: draft.retribution,
            estimated_hours: draft.estimated_hours,
            actual_hours,
            total_cost,
            state,
            maintenance_validated: record.maintenance_validated,
            created_by: clean_text(record.assignment.created_by),
            created_at: record.created_at.unwrap_or(now),
            updated_at: now,
            notes: clean_text(record.assignment.notes),
            idempotency_key: clean_text(record.assignment.idempotency_key),
        };
        let imported = self.persist_new(assignment)?;
        info!(
            assignment_id = %imported.id,
            equipment_id = %imported.equipment_id,
            state = %imported.state,
            "assignment imported"
        );
        Ok(imported)
    }

    /// Hard delete, only for finalized or cancelled records.
    pub fn purge(&self, id: Uuid) -> AssignmentResult<()> {
        let record = self.get(id)?;
        if !record.is_terminal() {
            return Err(AssignmentError::InvalidState {
                id,
                state: record.state,
            });
        }
        if !self.ledger.delete(id)? {
            return Err(AssignmentError::NotFound(id));
        }
        info!(assignment_id = %id, state = %record.state, "assignment purged");
        Ok(())
    }

    fn replay(&self, key: Option<&str>) -> AssignmentResult<Option<Assignment>> {
        let Some(key) = key.map(str::trim).filter(|key| !key.is_empty()) else {
            return Ok(None);
        };
        let existing = self.ledger.find_by_idempotency_key(key)?;
        if let Some(existing) = &existing {
            info!(
                assignment_id = %existing.id,
                idempotency_key = key,
                "replaying earlier create"
            );
        }
        Ok(existing)
    }

    /// Validates the create fields, collecting every problem into `errors`.
    /// Returns a draft only when all referenced records were found.
    fn prepare(
        &self,
        input: &NewAssignment,
        require_operative: bool,
        errors: &mut ValidationErrors,
    ) -> AssignmentResult<Option<Draft>> {
        let equipment_id = required_text(errors, "equipmentId", input.equipment_id.as_deref());
        let project_id = required_text(errors, "projectId", input.project_id.as_deref());
        let cost_center_id =
            required_text(errors, "costCenterId", input.cost_center_id.as_deref());

        let start_date = input.start_date;
        match start_date {
            Some(start) => check_expected_end(errors, start, input.expected_end_date),
            None => errors.push("startDate", "is required"),
        }

        let estimated_hours = input.estimated_hours.unwrap_or(Decimal::ZERO);
        check_hours(errors, "estimatedHours", estimated_hours);

        if let Some(equipment_id) = &equipment_id {
            self.check_equipment(errors, equipment_id, require_operative)?;
        }

        let project = match &project_id {
            Some(project_id) => {
                let project = self.projects.project(project_id)?;
                if project.is_none() {
                    errors.push("projectId", format!("unknown project '{project_id}'"));
                }
                project
            }
            None => None,
        };

        let retribution = project.as_ref().map(|project| {
            let terms = self.defaults.complete(
                project.kind,
                input.retribution_mode,
                input.retribution_value,
            );
            check_retribution(errors, &terms, &project.pricing());
            terms
        });

        let (
            Some(equipment_id),
            Some(project),
            Some(cost_center_id),
            Some(start_date),
            Some(retribution),
        ) = (equipment_id, project, cost_center_id, start_date, retribution)
        else {
            return Ok(None);
        };
        Ok(Some(Draft {
            equipment_id,
            project,
            cost_center_id,
            start_date,
            expected_end_date: input.expected_end_date,
            retribution,
            estimated_hours,
        }))
    }

    fn check_equipment(
        &self,
        errors: &mut ValidationErrors,
        equipment_id: &str,
        require_operative: bool,
    ) -> AssignmentResult<()> {
        match self.equipment.equipment(equipment_id)? {
            None => errors.push("equipmentId", format!("unknown equipment '{equipment_id}'")),
            Some(equipment)
                if require_operative
                    && equipment.operational_status != OperationalStatus::Operative =>
            {
                errors.push(
                    "equipmentId",
                    format!(
                        "equipment '{equipment_id}' is {} and cannot be assigned",
                        equipment.operational_status
                    ),
                );
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn project_for_record(&self, record: &Assignment) -> AssignmentResult<Project> {
        self.projects.project(&record.project_id)?.ok_or_else(|| {
            AssignmentError::validation(
                "projectId",
                format!("project '{}' is no longer in the catalog", record.project_id),
            )
        })
    }

    /// Early exclusivity check. The ledger repeats it atomically on write.
    fn ensure_equipment_free(
        &self,
        equipment_id: &str,
        except: Option<Uuid>,
    ) -> AssignmentResult<()> {
        match self.ledger.find_active_by_equipment(equipment_id)? {
            Some(active) if Some(active.id) != except => {
                warn!(
                    equipment_id,
                    active_id = %active.id,
                    "equipment already has an active assignment"
                );
                Err(AssignmentError::EquipmentAlreadyAssigned {
                    equipment_id: equipment_id.to_string(),
                    active_id: active.id,
                })
            }
            _ => Ok(()),
        }
    }

    fn price(
        &self,
        retribution: &Retribution,
        hours: Decimal,
        project: &Project,
    ) -> AssignmentResult<Decimal> {
        compute_cost(retribution, hours, &project.pricing())
            .map(round_currency)
            .map_err(|err| {
                error!(
                    project_id = %project.id,
                    %retribution,
                    error = %err,
                    "retribution policy rejected terms that passed validation"
                );
                AssignmentError::Policy(err)
            })
    }

    fn persist_new(&self, assignment: Assignment) -> AssignmentResult<Assignment> {
        match self.ledger.insert(&assignment) {
            Ok(_) => Ok(assignment),
            Err(LedgerError::DuplicateIdempotencyKey { existing_id }) => {
                info!(
                    assignment_id = %existing_id,
                    "concurrent create with the same idempotency key"
                );
                self.get(existing_id)
            }
            Err(err @ LedgerError::EquipmentBusy { .. }) => {
                warn!(equipment_id = %assignment.equipment_id, "lost exclusivity race at commit");
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}
