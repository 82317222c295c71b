//! SQLite-backed ledger and catalog.
//!
//! Records are stored as JSON blobs next to the columns the ledger queries
//! on. A partial unique index on `equipment_id` for active rows backs the
//! exclusivity rule even when several processes share the database file.

use super::PersistenceResult;
use crate::assignment_validation::validate_assignment;
use crate::catalog::{
    CatalogError, CatalogResult, CatalogSnapshot, EquipmentDirectory, ProjectCatalog,
};
use crate::ledger::{AssignmentLedger, LedgerError, LedgerResult, sort_for_listing};
use crate::model::{Assignment, AssignmentFilter, AssignmentState, Equipment, Project};
use chrono::SecondsFormat;
use parking_lot::Mutex;
use rusqlite::{
    Connection, ErrorCode, OptionalExtension, Transaction, TransactionBehavior, params,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const ACTIVE: &str = "ACTIVE";

pub struct SqliteStore {
    connection: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    pub fn in_memory() -> PersistenceResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                project_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS equipment (
                id TEXT PRIMARY KEY,
                equipment_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS assignments (
                id TEXT PRIMARY KEY,
                equipment_id TEXT NOT NULL,
                project_id TEXT NOT NULL,
                cost_center_id TEXT NOT NULL,
                state TEXT NOT NULL,
                idempotency_key TEXT UNIQUE,
                created_at TEXT NOT NULL,
                assignment_json TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS one_active_per_equipment
                ON assignments (equipment_id) WHERE state = 'ACTIVE';
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    pub fn upsert_project(&self, project: &Project) -> PersistenceResult<()> {
        let conn = self.connection.lock();
        Self::write_project(&conn, project)
    }

    pub fn upsert_equipment(&self, equipment: &Equipment) -> PersistenceResult<()> {
        let conn = self.connection.lock();
        Self::write_equipment(&conn, equipment)
    }

    /// Upserts every project and equipment entry in one transaction.
    pub fn load_catalog(&self, snapshot: &CatalogSnapshot) -> PersistenceResult<()> {
        let mut conn = self.connection.lock();
        let tx = conn.transaction()?;
        for project in &snapshot.projects {
            Self::write_project(&tx, project)?;
        }
        for equipment in &snapshot.equipment {
            Self::write_equipment(&tx, equipment)?;
        }
        tx.commit()?;
        debug!(
            projects = snapshot.projects.len(),
            equipment = snapshot.equipment.len(),
            "catalog loaded into sqlite"
        );
        Ok(())
    }

    fn write_project(conn: &Connection, project: &Project) -> PersistenceResult<()> {
        let json = serde_json::to_string(project)?;
        conn.execute(
            "INSERT INTO projects (id, project_json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET project_json = excluded.project_json",
            params![project.id, json],
        )?;
        Ok(())
    }

    fn write_equipment(conn: &Connection, equipment: &Equipment) -> PersistenceResult<()> {
        let json = serde_json::to_string(equipment)?;
        conn.execute(
            "INSERT INTO equipment (id, equipment_json) VALUES (?1, ?2)
             ON CONFLICT(id) DO UPDATE SET equipment_json = excluded.equipment_json",
            params![equipment.id, json],
        )?;
        Ok(())
    }

    fn active_holder(conn: &Connection, equipment_id: &str) -> LedgerResult<Option<Uuid>> {
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM assignments WHERE equipment_id = ?1 AND state = ?2",
                params![equipment_id, ACTIVE],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| parse_id(&id)).transpose()
    }

    fn id_for_key(conn: &Connection, key: &str) -> LedgerResult<Option<Uuid>> {
        let id: Option<String> = conn
            .query_row(
                "SELECT id FROM assignments WHERE idempotency_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| parse_id(&id)).transpose()
    }

    fn read_one(conn: &Connection, sql: &str, key: &str) -> LedgerResult<Option<Assignment>> {
        let json: Option<String> = conn
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        json.map(|json| decode_assignment(&json)).transpose()
    }

    /// Turns a unique-index violation into the matching ledger conflict.
    fn explain_conflict(
        tx: &Transaction<'_>,
        assignment: &Assignment,
        err: rusqlite::Error,
    ) -> LedgerError {
        if !is_constraint_violation(&err) {
            return err.into();
        }
        if assignment.state == AssignmentState::Active {
            match Self::active_holder(tx, &assignment.equipment_id) {
                Ok(Some(active_id)) if active_id != assignment.id => {
                    return LedgerError::EquipmentBusy {
                        equipment_id: assignment.equipment_id.clone(),
                        active_id,
                    };
                }
                Ok(_) => {}
                Err(lookup) => return lookup,
            }
        }
        if let Some(key) = &assignment.idempotency_key {
            match Self::id_for_key(tx, key) {
                Ok(Some(existing_id)) if existing_id != assignment.id => {
                    return LedgerError::DuplicateIdempotencyKey { existing_id };
                }
                Ok(_) => {}
                Err(lookup) => return lookup,
            }
        }
        warn!(assignment_id = %assignment.id, error = %err, "unexplained constraint violation");
        err.into()
    }
}

impl AssignmentLedger for SqliteStore {
    fn find_active_by_equipment(&self, equipment_id: &str) -> LedgerResult<Option<Assignment>> {
        let conn = self.connection.lock();
        Self::read_one(
            &conn,
            "SELECT assignment_json FROM assignments WHERE equipment_id = ?1 AND state = 'ACTIVE'",
            equipment_id,
        )
    }

    fn find_by_idempotency_key(&self, key: &str) -> LedgerResult<Option<Assignment>> {
        let conn = self.connection.lock();
        Self::read_one(
            &conn,
            "SELECT assignment_json FROM assignments WHERE idempotency_key = ?1",
            key,
        )
    }

    fn insert(&self, assignment: &Assignment) -> LedgerResult<Uuid> {
        let json = encode_assignment(assignment)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let id = assignment.id.to_string();
        let exists: Option<i64> = tx
            .query_row("SELECT 1 FROM assignments WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        if exists.is_some() {
            return Err(LedgerError::DuplicateId(assignment.id));
        }
        if let Some(key) = &assignment.idempotency_key {
            if let Some(existing_id) = Self::id_for_key(&tx, key)? {
                return Err(LedgerError::DuplicateIdempotencyKey { existing_id });
            }
        }
        if assignment.state == AssignmentState::Active {
            if let Some(active_id) = Self::active_holder(&tx, &assignment.equipment_id)? {
                return Err(LedgerError::EquipmentBusy {
                    equipment_id: assignment.equipment_id.clone(),
                    active_id,
                });
            }
        }

        let inserted = tx.execute(
            "INSERT INTO assignments
                (id, equipment_id, project_id, cost_center_id, state, idempotency_key, created_at, assignment_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                assignment.equipment_id,
                assignment.project_id,
                assignment.cost_center_id,
                assignment.state.as_str(),
                assignment.idempotency_key,
                created_at_column(assignment),
                json,
            ],
        );
        if let Err(err) = inserted {
            return Err(Self::explain_conflict(&tx, assignment, err));
        }
        tx.commit()?;
        Ok(assignment.id)
    }

    fn update(&self, expected: &Assignment, assignment: &Assignment) -> LedgerResult<()> {
        let id = expected.id;
        let json = encode_assignment(assignment)?;
        let mut conn = self.connection.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = Self::read_one(
            &tx,
            "SELECT assignment_json FROM assignments WHERE id = ?1",
            &id.to_string(),
        )?;
        match stored {
            None => return Err(LedgerError::NotFound(id)),
            Some(stored) if &stored != expected => {
                debug!(assignment_id = %id, state = %stored.state, "refusing stale update");
                return Err(LedgerError::Stale {
                    id,
                    state: stored.state,
                });
            }
            Some(_) => {}
        }

        if assignment.state == AssignmentState::Active {
            if let Some(active_id) = Self::active_holder(&tx, &assignment.equipment_id)? {
                if active_id != id {
                    return Err(LedgerError::EquipmentBusy {
                        equipment_id: assignment.equipment_id.clone(),
                        active_id,
                    });
                }
            }
        }

        let updated = tx.execute(
            "UPDATE assignments
             SET equipment_id = ?2, project_id = ?3, cost_center_id = ?4, state = ?5,
                 idempotency_key = ?6, created_at = ?7, assignment_json = ?8
             WHERE id = ?1",
            params![
                id.to_string(),
                assignment.equipment_id,
                assignment.project_id,
                assignment.cost_center_id,
                assignment.state.as_str(),
                assignment.idempotency_key,
                created_at_column(assignment),
                json,
            ],
        );
        match updated {
            Ok(0) => return Err(LedgerError::NotFound(id)),
            Ok(_) => {}
            Err(err) => return Err(Self::explain_conflict(&tx, assignment, err)),
        }
        tx.commit()?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> LedgerResult<Option<Assignment>> {
        let conn = self.connection.lock();
        Self::read_one(
            &conn,
            "SELECT assignment_json FROM assignments WHERE id = ?1",
            &id.to_string(),
        )
    }

    fn list(&self, filter: &AssignmentFilter) -> LedgerResult<Vec<Assignment>> {
        let conn = self.connection.lock();
        let mut stmt = conn.prepare(
            "SELECT assignment_json FROM assignments
             WHERE (?1 IS NULL OR equipment_id = ?1)
               AND (?2 IS NULL OR project_id = ?2)
               AND (?3 IS NULL OR cost_center_id = ?3)
               AND (?4 IS NULL OR state = ?4)",
        )?;
        let rows = stmt.query_map(
            params![
                filter.equipment_id.as_deref(),
                filter.project_id.as_deref(),
                filter.cost_center_id.as_deref(),
                filter.state.map(|state| state.as_str()),
            ],
            |row| row.get::<_, String>(0),
        )?;

        let mut assignments = Vec::new();
        for json in rows {
            assignments.push(decode_assignment(&json?)?);
        }
        sort_for_listing(&mut assignments);
        Ok(assignments)
    }

    fn delete(&self, id: Uuid) -> LedgerResult<bool> {
        let conn = self.connection.lock();
        let removed = conn.execute(
            "DELETE FROM assignments WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(removed > 0)
    }
}

impl ProjectCatalog for SqliteStore {
    fn project(&self, project_id: &str) -> CatalogResult<Option<Project>> {
        let conn = self.connection.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT project_json FROM projects WHERE id = ?1",
                params![project_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| {
            serde_json::from_str(&json).map_err(|err| CatalogError::Backend(err.to_string()))
        })
        .transpose()
    }
}

impl EquipmentDirectory for SqliteStore {
    fn equipment(&self, equipment_id: &str) -> CatalogResult<Option<Equipment>> {
        let conn = self.connection.lock();
        let json: Option<String> = conn
            .query_row(
                "SELECT equipment_json FROM equipment WHERE id = ?1",
                params![equipment_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| {
            serde_json::from_str(&json).map_err(|err| CatalogError::Backend(err.to_string()))
        })
        .transpose()
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(value: rusqlite::Error) -> Self {
        LedgerError::Storage(value.to_string())
    }
}

impl From<rusqlite::Error> for CatalogError {
    fn from(value: rusqlite::Error) -> Self {
        CatalogError::Backend(value.to_string())
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

// Fixed-width timestamps keep the column sortable as text.
fn created_at_column(assignment: &Assignment) -> String {
    assignment
        .created_at
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_id(raw: &str) -> LedgerResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|err| LedgerError::Storage(format!("stored id '{raw}' is not a uuid: {err}")))
}

fn encode_assignment(assignment: &Assignment) -> LedgerResult<String> {
    validate_assignment(assignment).map_err(|errors| {
        LedgerError::Storage(format!(
            "refusing to store invalid assignment {}: {errors}",
            assignment.id
        ))
    })?;
    serde_json::to_string(assignment).map_err(|err| LedgerError::Storage(err.to_string()))
}

fn decode_assignment(json: &str) -> LedgerResult<Assignment> {
    let assignment: Assignment =
        serde_json::from_str(json).map_err(|err| LedgerError::Storage(err.to_string()))?;
    validate_assignment(&assignment).map_err(|errors| {
        LedgerError::Storage(format!(
            "stored assignment {} is invalid: {errors}",
            assignment.id
        ))
    })?;
    Ok(assignment)
}
