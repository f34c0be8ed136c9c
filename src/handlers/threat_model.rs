use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{parse_uuid, store_error};
use crate::models::{ApiError, ErrorResponse, ThreatModel, ThreatModelCreateRequest};
use crate::services::auth_service::AuthUser;
use crate::AppState;

/// Create a threat model owned by the caller
pub async fn threat_model_create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<ThreatModelCreateRequest>,
) -> Result<(StatusCode, Json<ThreatModel>), ApiError> {
    if request.name.trim().is_empty() {
        return Err(ErrorResponse::bad_request("Threat model name must not be empty"));
    }

    let threat_model = state
        .store
        .create_threat_model(&user.user_id, request)
        .await
        .map_err(|e| store_error("Failed to create threat model", e))?;

    info!("Threat model '{}' created by {}", threat_model.id, user.user_id);
    Ok((StatusCode::CREATED, Json(threat_model)))
}

pub async fn threat_model_get(
    State(state): State<AppState>,
    Path(threat_model_id): Path<String>,
) -> Result<(StatusCode, Json<ThreatModel>), ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;

    match state.store.get_threat_model(&tm_uuid).await {
        Ok(Some(threat_model)) => Ok((StatusCode::OK, Json(threat_model))),
        Ok(None) => Err(ErrorResponse::not_found(format!("Threat model {} not found", tm_uuid))),
        Err(e) => Err(store_error("Failed to load threat model", e)),
    }
}

/// Delete a threat model with all its diagrams, unless one of them is being edited live
pub async fn threat_model_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(threat_model_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;

    match state.store.get_threat_model(&tm_uuid).await {
        Ok(Some(_)) => {}
        Ok(None) => return Err(ErrorResponse::not_found(format!("Threat model {} not found", tm_uuid))),
        Err(e) => return Err(store_error("Failed to load threat model", e)),
    }

    let diagram_ids = state
        .store
        .list_diagram_ids(&tm_uuid)
        .await
        .map_err(|e| store_error("Failed to list diagrams", e))?;
    state.guard.ensure_diagrams_editable(&tm_uuid, &diagram_ids)?;

    let deleted = state
        .store
        .delete_threat_model(&tm_uuid)
        .await
        .map_err(|e| store_error("Failed to delete threat model", e))?;
    if !deleted {
        return Err(ErrorResponse::not_found(format!("Threat model {} not found", tm_uuid)));
    }

    info!("Threat model '{}' deleted by {}", tm_uuid, user.user_id);
    Ok(StatusCode::NO_CONTENT)
}
