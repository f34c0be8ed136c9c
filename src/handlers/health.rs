use axum::{extract::State, Json};
use crate::models::HealthResponse;
use crate::AppState;
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
        active_sessions: state.hub.session_count(),
    })
}
