pub mod memory;
pub mod dbdiagram;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    CellChange, Diagram, DiagramCreateRequest, DiagramPatchRequest, Operation, ThreatModel,
    ThreatModelCreateRequest,
};

pub use memory::MemoryStore;
pub use dbdiagram::DbDiagram;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence of threat models and their diagrams
#[async_trait]
pub trait DiagramStore: Send + Sync {
    async fn create_threat_model(&self, owner: &str, request: ThreatModelCreateRequest) -> StoreResult<ThreatModel>;

    async fn get_threat_model(&self, id: &Uuid) -> StoreResult<Option<ThreatModel>>;

    /// Delete a threat model together with its diagrams
    async fn delete_threat_model(&self, id: &Uuid) -> StoreResult<bool>;

    async fn list_diagram_ids(&self, threat_model_id: &Uuid) -> StoreResult<Vec<Uuid>>;

    async fn create_diagram(&self, threat_model_id: &Uuid, request: DiagramCreateRequest) -> StoreResult<Diagram>;

    async fn get_diagram(&self, id: &Uuid) -> StoreResult<Option<Diagram>>;

    async fn update_diagram(&self, id: &Uuid, patch: DiagramPatchRequest) -> StoreResult<Option<Diagram>>;

    async fn delete_diagram(&self, id: &Uuid) -> StoreResult<bool>;

    /// Persist one collaborative edit
    async fn apply_operation(&self, diagram_id: &Uuid, operation: &Operation) -> StoreResult<CellChange>;
}
