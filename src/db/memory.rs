use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{DiagramStore, StoreError, StoreResult};
use crate::models::{
    apply_operation_to_cells, CellChange, Diagram, DiagramCreateRequest, DiagramPatchRequest, Operation,
    ThreatModel, ThreatModelCreateRequest,
};

#[derive(Default)]
struct Tables {
    threat_models: HashMap<Uuid, ThreatModel>,
    diagrams: HashMap<Uuid, Diagram>,
}

/// In-process store, used when no database is configured
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DiagramStore for MemoryStore {
    async fn create_threat_model(&self, owner: &str, request: ThreatModelCreateRequest) -> StoreResult<ThreatModel> {
        let now = Utc::now();
        let threat_model = ThreatModel {
            id: Uuid::new_v4(),
            name: request.name,
            description: request.description,
            owner: owner.to_string(),
            created_at: now,
            modified_at: now,
        };
        self.tables
            .write()
            .await
            .threat_models
            .insert(threat_model.id, threat_model.clone());
        Ok(threat_model)
    }

    async fn get_threat_model(&self, id: &Uuid) -> StoreResult<Option<ThreatModel>> {
        Ok(self.tables.read().await.threat_models.get(id).cloned())
    }

    async fn delete_threat_model(&self, id: &Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        if tables.threat_models.remove(id).is_none() {
            return Ok(false);
        }
        tables.diagrams.retain(|_, diagram| diagram.threat_model_id != *id);
        Ok(true)
    }

    async fn list_diagram_ids(&self, threat_model_id: &Uuid) -> StoreResult<Vec<Uuid>> {
        Ok(self
            .tables
            .read()
            .await
            .diagrams
            .values()
            .filter(|diagram| diagram.threat_model_id == *threat_model_id)
            .map(|diagram| diagram.id)
            .collect())
    }

    async fn create_diagram(&self, threat_model_id: &Uuid, request: DiagramCreateRequest) -> StoreResult<Diagram> {
        let mut tables = self.tables.write().await;
        if !tables.threat_models.contains_key(threat_model_id) {
            return Err(StoreError::NotFound(format!("threat model {}", threat_model_id)));
        }
        let now = Utc::now();
        let diagram = Diagram {
            id: Uuid::new_v4(),
            threat_model_id: *threat_model_id,
            name: request.name,
            cells: request.cells,
            update_vector: 0,
            created_at: now,
            modified_at: now,
        };
        tables.diagrams.insert(diagram.id, diagram.clone());
        Ok(diagram)
    }

    async fn get_diagram(&self, id: &Uuid) -> StoreResult<Option<Diagram>> {
        Ok(self.tables.read().await.diagrams.get(id).cloned())
    }

    async fn update_diagram(&self, id: &Uuid, patch: DiagramPatchRequest) -> StoreResult<Option<Diagram>> {
        let mut tables = self.tables.write().await;
        let Some(diagram) = tables.diagrams.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = patch.name {
            diagram.name = name;
        }
        if let Some(cells) = patch.cells {
            diagram.cells = cells;
        }
        diagram.update_vector += 1;
        diagram.modified_at = Utc::now();
        Ok(Some(diagram.clone()))
    }

    async fn delete_diagram(&self, id: &Uuid) -> StoreResult<bool> {
        Ok(self.tables.write().await.diagrams.remove(id).is_some())
    }

    async fn apply_operation(&self, diagram_id: &Uuid, operation: &Operation) -> StoreResult<CellChange> {
        let mut tables = self.tables.write().await;
        let diagram = tables
            .diagrams
            .get_mut(diagram_id)
            .ok_or_else(|| StoreError::NotFound(format!("diagram {}", diagram_id)))?;

        let change = apply_operation_to_cells(&mut diagram.cells, operation).map_err(StoreError::InvalidOperation)?;
        if change == CellChange::Changed {
            diagram.update_vector += 1;
            diagram.modified_at = Utc::now();
        }
        Ok(change)
    }
}
