pub mod health;
pub mod threat_model;
pub mod diagram;
pub mod collaborate;

pub use health::*;
pub use threat_model::*;
pub use diagram::*;
pub use collaborate::*;

use tracing::error;
use uuid::Uuid;

use crate::db::{DiagramStore, StoreError};
use crate::models::{ApiError, Diagram, ErrorResponse};

/// Parse a path parameter as an UUID
pub(crate) fn parse_uuid(kind: &str, value: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value).map_err(|e| {
        error!("Invalid {} UUID '{}': {}", kind, value, e);
        ErrorResponse::bad_request(format!("Invalid {} UUID '{}'", kind, value))
    })
}

pub(crate) fn store_error(context: &str, e: StoreError) -> ApiError {
    match e {
        StoreError::NotFound(what) => ErrorResponse::not_found(format!("{} not found", what)),
        StoreError::InvalidOperation(msg) => ErrorResponse::bad_request(msg),
        StoreError::Database(e) => {
            error!("{}: {}", context, e);
            ErrorResponse::server_error(context.to_string())
        }
    }
}

/// Load a diagram and make sure it belongs to the threat model in the path
pub(crate) async fn load_diagram(
    store: &dyn DiagramStore,
    threat_model_id: &Uuid,
    diagram_id: &Uuid,
) -> Result<Diagram, ApiError> {
    match store.get_diagram(diagram_id).await {
        Ok(Some(diagram)) if diagram.threat_model_id == *threat_model_id => Ok(diagram),
        Ok(_) => Err(ErrorResponse::not_found(format!(
            "Diagram {} not found in threat model {}",
            diagram_id, threat_model_id
        ))),
        Err(e) => Err(store_error("Failed to load diagram", e)),
    }
}
