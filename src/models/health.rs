use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// API response for health check
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub message: String,
    /// Number of diagrams with a live collaboration session
    pub active_sessions: usize,
}
