use crate::error::ValidationErrors;
use crate::model::{Assignment, AssignmentState};
use chrono::NaiveDate;
use fleet_cost::{ProjectPricing, Retribution, TermsViolation, check_terms};
use rust_decimal::Decimal;

pub(crate) fn required_text(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
) -> Option<String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Some(text.to_string()),
        _ => {
            errors.push(field, "is required");
            None
        }
    }
}

pub(crate) fn check_hours(errors: &mut ValidationErrors, field: &str, hours: Decimal) {
    if hours < Decimal::ZERO {
        errors.push(field, format!("must be zero or greater (got {hours})"));
    }
}

pub(crate) fn check_expected_end(
    errors: &mut ValidationErrors,
    start: NaiveDate,
    expected_end: Option<NaiveDate>,
) {
    if let Some(end) = expected_end {
        if end <= start {
            errors.push(
                "expectedEndDate",
                format!("must be after startDate {start} (got {end})"),
            );
        }
    }
}

/// An actual end date belongs to finalized assignments only, and never
/// precedes the start date.
pub(crate) fn check_actual_end(
    errors: &mut ValidationErrors,
    state: AssignmentState,
    start: NaiveDate,
    actual_end: Option<NaiveDate>,
) {
    match (state, actual_end) {
        (AssignmentState::Finalized, None) => {
            errors.push("actualEndDate", "is required for FINALIZED assignments");
        }
        (AssignmentState::Finalized, Some(end)) if end < start => {
            errors.push(
                "actualEndDate",
                format!("must not precede startDate {start} (got {end})"),
            );
        }
        (AssignmentState::Finalized, Some(_)) => {}
        (other, Some(_)) => {
            errors.push(
                "actualEndDate",
                format!("is only set on FINALIZED assignments (state is {other})"),
            );
        }
        (_, None) => {}
    }
}

pub(crate) fn check_retribution(
    errors: &mut ValidationErrors,
    terms: &Retribution,
    project: &ProjectPricing,
) {
    if let Err(violation) = check_terms(terms, project) {
        let field = match violation {
            TermsViolation::MissingCostBasis { .. } => "retributionMode",
            TermsViolation::PercentageOutOfBand { .. } | TermsViolation::NonPositiveRate { .. } => {
                "retributionValue"
            }
        };
        errors.push(field, violation.to_string());
    }
}

/// Structural invariants every stored assignment satisfies. Pricing rules are
/// not re-checked here since they depend on the project catalog.
pub fn validate_assignment(assignment: &Assignment) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    for (field, value) in [
        ("equipmentId", assignment.equipment_id.as_str()),
        ("projectId", assignment.project_id.as_str()),
        ("costCenterId", assignment.cost_center_id.as_str()),
    ] {
        required_text(&mut errors, field, Some(value));
    }
    check_expected_end(
        &mut errors,
        assignment.start_date,
        assignment.expected_end_date,
    );
    check_actual_end(
        &mut errors,
        assignment.state,
        assignment.start_date,
        assignment.actual_end_date,
    );
    check_hours(&mut errors, "estimatedHours", assignment.estimated_hours);
    check_hours(&mut errors, "actualHours", assignment.actual_hours);
    if assignment.retribution.value() < Decimal::ZERO {
        errors.push("retributionValue", "must not be negative");
    }
    if assignment.total_cost < Decimal::ZERO {
        errors.push("totalCost", "must not be negative");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
