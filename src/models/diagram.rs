use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use super::Operation;

/// Threat model owning a set of diagrams
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ThreatModel {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub owner: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Request payload for creating a threat model
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct ThreatModelCreateRequest {
    pub name: String,
    pub description: Option<String>,
}

/// Data flow diagram
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct Diagram {
    pub id: Uuid,
    pub threat_model_id: Uuid,
    pub name: String,
    #[schema(value_type = Vec<Object>)]
    pub cells: Vec<Value>,
    /// Incremented on every content change
    pub update_vector: i64,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

/// Request payload for creating a diagram
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DiagramCreateRequest {
    pub name: String,
    #[serde(default)]
    #[schema(value_type = Vec<Object>)]
    pub cells: Vec<Value>,
}

/// Full replacement of a diagram (PUT)
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DiagramUpdateRequest {
    pub name: String,
    #[schema(value_type = Vec<Object>)]
    pub cells: Vec<Value>,
}

/// Partial update of a diagram (PATCH)
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Default)]
pub struct DiagramPatchRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<Vec<Object>>)]
    pub cells: Option<Vec<Value>>,
}

impl From<DiagramUpdateRequest> for DiagramPatchRequest {
    fn from(req: DiagramUpdateRequest) -> Self {
        Self {
            name: Some(req.name),
            cells: Some(req.cells),
        }
    }
}

/// Outcome of applying one operation to a diagram's cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellChange {
    Changed,
    Unchanged,
}

fn cell_id(cell: &Value) -> Option<&str> {
    cell.get("id").and_then(|id| id.as_str())
}

/// Apply an add, update or remove operation to a list of cells.
/// Other operation types carry no diagram content and leave the cells alone.
pub fn apply_operation_to_cells(cells: &mut Vec<Value>, op: &Operation) -> Result<CellChange, String> {
    match op.op_type.as_str() {
        "add" | "update" => {
            let component = match &op.component {
                Some(component @ Value::Object(_)) => component,
                _ => return Err(format!("'{}' requires a component object", op.op_type)),
            };
            let id = cell_id(component)
                .ok_or_else(|| format!("'{}' component has no string id", op.op_type))?;

            match cells.iter_mut().find(|cell| cell_id(cell) == Some(id)) {
                Some(cell) => *cell = component.clone(),
                None if op.op_type == "add" => cells.push(component.clone()),
                None => return Err(format!("cell '{}' does not exist", id)),
            }
            Ok(CellChange::Changed)
        }
        "remove" => {
            let id = op
                .component_id()
                .ok_or_else(|| "'remove' requires a component id".to_string())?;
            let before = cells.len();
            cells.retain(|cell| cell_id(cell) != Some(id));
            if cells.len() == before {
                Ok(CellChange::Unchanged)
            } else {
                Ok(CellChange::Changed)
            }
        }
        _ => Ok(CellChange::Unchanged),
    }
}
