use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{load_diagram, parse_uuid, store_error};
use crate::models::{
    ApiError, Diagram, DiagramCreateRequest, DiagramPatchRequest, DiagramUpdateRequest, ErrorResponse,
};
use crate::services::auth_service::AuthUser;
use crate::AppState;

pub async fn diagram_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(threat_model_id): Path<String>,
    Json(request): Json<DiagramCreateRequest>,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;
    if request.name.trim().is_empty() {
        return Err(ErrorResponse::bad_request("Diagram name must not be empty"));
    }

    let diagram = state
        .store
        .create_diagram(&tm_uuid, request)
        .await
        .map_err(|e| store_error("Failed to create diagram", e))?;

    info!("Diagram '{}' created in threat model '{}' by {}", diagram.id, tm_uuid, user.user_id);
    Ok((StatusCode::CREATED, Json(diagram)))
}

pub async fn diagram_get(
    State(state): State<AppState>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;
    let diagram_uuid = parse_uuid("diagram", &diagram_id)?;

    let diagram = load_diagram(state.store.as_ref(), &tm_uuid, &diagram_uuid).await?;
    Ok((StatusCode::OK, Json(diagram)))
}

/// Replace a diagram. Refused while the diagram is edited live.
pub async fn diagram_update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
    Json(request): Json<DiagramUpdateRequest>,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ErrorResponse::bad_request("Diagram name must not be empty"));
    }
    apply_patch(state, user, &threat_model_id, &diagram_id, request.into()).await
}

/// Partially update a diagram. Refused while the diagram is edited live.
pub async fn diagram_patch(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
    Json(request): Json<DiagramPatchRequest>,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    if request.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
        return Err(ErrorResponse::bad_request("Diagram name must not be empty"));
    }
    apply_patch(state, user, &threat_model_id, &diagram_id, request).await
}

async fn apply_patch(
    state: AppState,
    user: AuthUser,
    threat_model_id: &str,
    diagram_id: &str,
    patch: DiagramPatchRequest,
) -> Result<(StatusCode, Json<Diagram>), ApiError> {
    let tm_uuid = parse_uuid("threat model", threat_model_id)?;
    let diagram_uuid = parse_uuid("diagram", diagram_id)?;

    load_diagram(state.store.as_ref(), &tm_uuid, &diagram_uuid).await?;
    state.guard.ensure_diagram_editable(&diagram_uuid)?;

    match state.store.update_diagram(&diagram_uuid, patch).await {
        Ok(Some(diagram)) => {
            info!("Diagram '{}' updated by {}", diagram_uuid, user.user_id);
            Ok((StatusCode::OK, Json(diagram)))
        }
        Ok(None) => Err(ErrorResponse::not_found(format!("Diagram {} not found", diagram_uuid))),
        Err(e) => Err(store_error("Failed to update diagram", e)),
    }
}

/// Delete a diagram. Refused while the diagram is edited live.
pub async fn diagram_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;
    let diagram_uuid = parse_uuid("diagram", &diagram_id)?;

    load_diagram(state.store.as_ref(), &tm_uuid, &diagram_uuid).await?;
    state.guard.ensure_diagram_editable(&diagram_uuid)?;

    match state.store.delete_diagram(&diagram_uuid).await {
        Ok(true) => {
            info!("Diagram '{}' deleted by {}", diagram_uuid, user.user_id);
            Ok(StatusCode::NO_CONTENT)
        }
        Ok(false) => Err(ErrorResponse::not_found(format!("Diagram {} not found", diagram_uuid))),
        Err(e) => Err(store_error("Failed to delete diagram", e)),
    }
}
