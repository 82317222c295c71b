//! Read-only collaborators: the project catalog and the equipment directory.

use crate::model::{Equipment, Project};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog backend error: {0}")]
    Backend(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

pub trait ProjectCatalog: Send + Sync {
    fn project(&self, project_id: &str) -> CatalogResult<Option<Project>>;
}

pub trait EquipmentDirectory: Send + Sync {
    fn equipment(&self, equipment_id: &str) -> CatalogResult<Option<Equipment>>;
}

/// Serializable catalog contents, as loaded from a seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub equipment: Vec<Equipment>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    projects: RwLock<HashMap<String, Project>>,
    equipment: RwLock<HashMap<String, Equipment>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        catalog.load_snapshot(snapshot);
        catalog
    }

    pub fn load_snapshot(&self, snapshot: CatalogSnapshot) {
        for project in snapshot.projects {
            self.upsert_project(project);
        }
        for equipment in snapshot.equipment {
            self.upsert_equipment(equipment);
        }
    }

    pub fn upsert_project(&self, project: Project) {
        self.projects.write().insert(project.id.clone(), project);
    }

    pub fn upsert_equipment(&self, equipment: Equipment) {
        self.equipment
            .write()
            .insert(equipment.id.clone(), equipment);
    }
}

impl ProjectCatalog for InMemoryCatalog {
    fn project(&self, project_id: &str) -> CatalogResult<Option<Project>> {
        Ok(self.projects.read().get(project_id).cloned())
    }
}

impl EquipmentDirectory for InMemoryCatalog {
    fn equipment(&self, equipment_id: &str) -> CatalogResult<Option<Equipment>> {
        Ok(self.equipment.read().get(equipment_id).cloned())
    }
}
