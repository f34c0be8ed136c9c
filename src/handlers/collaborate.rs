use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use tracing::info;

use super::{load_diagram, parse_uuid};
use crate::models::{
    ApiError, CollaborationInfoResponse, CollaborationSession, CollaborationStartResponse, ErrorResponse,
};
use crate::services::auth_service::AuthUser;
use crate::AppState;

/// Current collaboration session of a diagram
pub async fn collaborate_info(
    State(state): State<AppState>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<CollaborationInfoResponse>), ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;
    let diagram_uuid = parse_uuid("diagram", &diagram_id)?;
    load_diagram(state.store.as_ref(), &tm_uuid, &diagram_uuid).await?;

    let Some(session) = state.hub.get_session(&diagram_uuid) else {
        return Err(ErrorResponse::not_found(format!(
            "No collaboration session is active for diagram {}",
            diagram_uuid
        )));
    };

    Ok((
        StatusCode::OK,
        Json(CollaborationInfoResponse {
            session_id: session.id(),
            diagram_id: diagram_uuid,
            websocket_url: state.config.websocket_url(&diagram_uuid),
            started_at: session.started_at(),
            participants: session.participants(),
        }),
    ))
}

/// Start a collaboration session, or return the one already running
pub async fn collaborate_start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((threat_model_id, diagram_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<CollaborationStartResponse>), ApiError> {
    let tm_uuid = parse_uuid("threat model", &threat_model_id)?;
    let diagram_uuid = parse_uuid("diagram", &diagram_id)?;
    load_diagram(state.store.as_ref(), &tm_uuid, &diagram_uuid).await?;

    let (session, created) = state.hub.get_or_create_session(&diagram_uuid);
    if created {
        info!("{} started collaboration session {} on diagram {}", user.user_id, session.id(), diagram_uuid);
    } else {
        info!("{} requested the running session {} on diagram {}", user.user_id, session.id(), diagram_uuid);
    }

    Ok((
        StatusCode::CREATED,
        Json(CollaborationStartResponse {
            session_id: session.id(),
            diagram_id: diagram_uuid,
            started_at: session.started_at(),
            websocket_url: state.config.websocket_url(&diagram_uuid),
        }),
    ))
}

/// End the diagram's session, disconnecting everyone. Succeeds without a session too.
pub async fn collaborate_end(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((_threat_model_id, diagram_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let diagram_uuid = parse_uuid("diagram", &diagram_id)?;

    if state.hub.remove_session(&diagram_uuid) {
        info!("{} ended the collaboration session on diagram {}", user.user_id, diagram_uuid);
    }
    Ok(StatusCode::NO_CONTENT)
}

/// All live sessions, for observability
pub async fn collaboration_sessions(State(state): State<AppState>) -> Json<Vec<CollaborationSession>> {
    Json(state.hub.list_sessions())
}
