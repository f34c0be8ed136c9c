use crate::handlers::{
    collaborate_end, collaborate_info, collaborate_start, collaboration_sessions, diagram_create, diagram_delete,
    diagram_get, diagram_patch, diagram_update, health_check, threat_model_create, threat_model_delete,
    threat_model_get,
};
use crate::routes::auth_middleware::auth_middleware;
use crate::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};

/// Create API routes
pub fn create_api_routes(state: AppState) -> Router<AppState> {
    Router::<AppState>::new()
        .route("/v1/threat_models", post(threat_model_create))
        .route("/v1/threat_models/:threat_model_id", get(threat_model_get).delete(threat_model_delete))
        .route("/v1/threat_models/:threat_model_id/diagrams", post(diagram_create))
        .route(
            "/v1/threat_models/:threat_model_id/diagrams/:diagram_id",
            get(diagram_get).put(diagram_update).patch(diagram_patch).delete(diagram_delete),
        )
        .route(
            "/v1/threat_models/:threat_model_id/diagrams/:diagram_id/collaborate",
            get(collaborate_info).post(collaborate_start).delete(collaborate_end),
        )
        .route("/v1/collaboration/sessions", get(collaboration_sessions))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware)) // Applies to all routes added above
        .route("/health", get(health_check))
}
