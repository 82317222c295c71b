use std::error::Error;
use std::sync::Arc;

use fleet_assign::{
    AssignmentController, CatalogSnapshot, InMemoryCatalog, InMemoryLedger, ServiceConfig,
    http_api, load_catalog_from_json, telemetry,
};
use tracing::info;

fn load_snapshot(config: &ServiceConfig) -> Result<CatalogSnapshot, Box<dyn Error>> {
    match &config.catalog_path {
        Some(path) => {
            let snapshot = load_catalog_from_json(path)?;
            info!(
                path = %path.display(),
                projects = snapshot.projects.len(),
                equipment = snapshot.equipment.len(),
                "catalog loaded"
            );
            Ok(snapshot)
        }
        None => Ok(CatalogSnapshot::default()),
    }
}

fn build_controller(config: &ServiceConfig) -> Result<AssignmentController, Box<dyn Error>> {
    let snapshot = load_snapshot(config)?;
    let controller = match &config.db_path {
        #[cfg(feature = "sqlite")]
        Some(path) => {
            let store = Arc::new(fleet_assign::SqliteStore::new(path)?);
            store.load_catalog(&snapshot)?;
            info!(path = %path.display(), "using sqlite ledger");
            AssignmentController::new(store.clone(), store.clone(), store)
        }
        #[cfg(not(feature = "sqlite"))]
        Some(_) => return Err("FLEET_DB_PATH needs a build with the `sqlite` feature".into()),
        None => {
            let catalog = Arc::new(InMemoryCatalog::from_snapshot(snapshot));
            info!("using in-memory ledger");
            AssignmentController::new(Arc::new(InMemoryLedger::new()), catalog.clone(), catalog)
        }
    };
    Ok(controller.with_defaults(config.defaults))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = ServiceConfig::from_env()?;
    telemetry::init_tracing(config.log_json, "info");

    let controller = build_controller(&config)?;
    http_api::serve(config.http_addr, http_api::AppState::new(controller)).await?;
    Ok(())
}
