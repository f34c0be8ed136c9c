use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A user currently connected to a session
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct Participant {
    pub user_id: String,
    pub joined_at: DateTime<Utc>,
}

/// Read-only snapshot of a live session, taken at query time
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct CollaborationSession {
    pub session_id: Uuid,
    pub diagram_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

/// Response for `GET .../collaborate`
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CollaborationInfoResponse {
    pub session_id: Uuid,
    pub diagram_id: Uuid,
    pub websocket_url: String,
    pub started_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
}

/// Response for `POST .../collaborate`
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CollaborationStartResponse {
    pub session_id: Uuid,
    pub diagram_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub websocket_url: String,
}
