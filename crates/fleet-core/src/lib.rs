pub mod assignment_validation;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
#[cfg(feature = "http_api")]
pub mod http_api;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod persistence;
#[cfg(any(feature = "http_api", feature = "cli"))]
pub mod telemetry;

pub use assignment_validation::validate_assignment;
pub use catalog::{
    CatalogError, CatalogSnapshot, EquipmentDirectory, InMemoryCatalog, ProjectCatalog,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, ServiceConfig};
pub use error::{AssignmentError, AssignmentResult, FieldError, ValidationErrors};
pub use ledger::{AssignmentLedger, InMemoryLedger, LedgerError};
pub use lifecycle::{
    AssignmentController, ImportRecord, NewAssignment, TermsPatch, TransitionRequest,
};
pub use model::{
    Assignment, AssignmentFilter, AssignmentState, Equipment, OperationalStatus, Project,
};
#[cfg(feature = "sqlite")]
pub use persistence::sqlite::SqliteStore;
pub use persistence::{
    PersistenceError, export_assignments_to_csv, load_catalog_from_json,
    load_import_records_from_json, write_assignments_csv,
};
