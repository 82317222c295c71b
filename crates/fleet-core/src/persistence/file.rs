use super::{PersistenceError, PersistenceResult};
use crate::catalog::CatalogSnapshot;
use crate::lifecycle::ImportRecord;
use crate::model::Assignment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

pub fn load_catalog_from_json<P: AsRef<Path>>(path: P) -> PersistenceResult<CatalogSnapshot> {
    let file = File::open(path)?;
    let snapshot: CatalogSnapshot = serde_json::from_reader(BufReader::new(file))?;

    let mut project_ids = HashSet::with_capacity(snapshot.projects.len());
    for project in &snapshot.projects {
        if project.id.trim().is_empty() {
            return Err(PersistenceError::InvalidData(
                "catalog project with empty id".into(),
            ));
        }
        if !project_ids.insert(project.id.as_str()) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate project id {}",
                project.id
            )));
        }
    }
    let mut equipment_ids = HashSet::with_capacity(snapshot.equipment.len());
    for equipment in &snapshot.equipment {
        if equipment.id.trim().is_empty() {
            return Err(PersistenceError::InvalidData(
                "catalog equipment with empty id".into(),
            ));
        }
        if !equipment_ids.insert(equipment.id.as_str()) {
            return Err(PersistenceError::InvalidData(format!(
                "duplicate equipment id {}",
                equipment.id
            )));
        }
    }
    Ok(snapshot)
}

/// Reads a JSON array of records for the administrative import path.
pub fn load_import_records_from_json<P: AsRef<Path>>(
    path: P,
) -> PersistenceResult<Vec<ImportRecord>> {
    let file = File::open(path)?;
    let records = serde_json::from_reader(BufReader::new(file))?;
    Ok(records)
}

#[derive(Default, Serialize, Deserialize)]
struct AssignmentCsvRecord {
    id: String,
    equipment_id: String,
    project_id: String,
    cost_center_id: String,
    state: String,
    start_date: String,
    expected_end_date: String,
    actual_end_date: String,
    retribution_mode: String,
    retribution_value: String,
    estimated_hours: String,
    actual_hours: String,
    total_cost: String,
    maintenance_validated: String,
    created_by: String,
    notes: String,
}

impl From<&Assignment> for AssignmentCsvRecord {
    fn from(assignment: &Assignment) -> Self {
        Self {
            id: assignment.id.to_string(),
            equipment_id: assignment.equipment_id.clone(),
            project_id: assignment.project_id.clone(),
            cost_center_id: assignment.cost_center_id.clone(),
            state: assignment.state.as_str().to_string(),
            start_date: assignment.start_date.to_string(),
            expected_end_date: format_date(assignment.expected_end_date),
            actual_end_date: format_date(assignment.actual_end_date),
            retribution_mode: assignment.retribution.mode().as_str().to_string(),
            retribution_value: assignment.retribution.value().to_string(),
            estimated_hours: assignment.estimated_hours.to_string(),
            actual_hours: assignment.actual_hours.to_string(),
            total_cost: assignment.total_cost.to_string(),
            maintenance_validated: assignment.maintenance_validated.to_string(),
            created_by: assignment.created_by.clone().unwrap_or_default(),
            notes: assignment.notes.clone().unwrap_or_default(),
        }
    }
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Writes assignments as CSV with a header row.
pub fn write_assignments_csv<W: Write>(
    assignments: &[Assignment],
    writer: W,
) -> PersistenceResult<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for assignment in assignments {
        csv_writer.serialize(AssignmentCsvRecord::from(assignment))?;
    }
    csv_writer.flush()?;
    Ok(())
}

pub fn export_assignments_to_csv<P: AsRef<Path>>(
    assignments: &[Assignment],
    path: P,
) -> PersistenceResult<()> {
    let file = File::create(path)?;
    write_assignments_csv(assignments, file)
}
