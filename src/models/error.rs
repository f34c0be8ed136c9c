use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error returned by every REST handler
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    /// Short machine readable error code, e.g. `conflict`
    pub error: String,
    pub error_description: String,
}

impl ErrorResponse {
    pub fn build(status: StatusCode, error: &str, description: impl Into<String>) -> ApiError {
        (
            status,
            Json(ErrorResponse {
                code: status.as_u16(),
                status: status.to_string(),
                error: error.to_string(),
                error_description: description.into(),
            }),
        )
    }

    pub fn bad_request(description: impl Into<String>) -> ApiError {
        Self::build(StatusCode::BAD_REQUEST, "invalid_input", description)
    }

    pub fn unauthorized(description: impl Into<String>) -> ApiError {
        Self::build(StatusCode::UNAUTHORIZED, "unauthorized", description)
    }

    pub fn not_found(description: impl Into<String>) -> ApiError {
        Self::build(StatusCode::NOT_FOUND, "not_found", description)
    }

    pub fn conflict(description: impl Into<String>) -> ApiError {
        Self::build(StatusCode::CONFLICT, "conflict", description)
    }

    pub fn server_error(description: impl Into<String>) -> ApiError {
        Self::build(StatusCode::INTERNAL_SERVER_ERROR, "server_error", description)
    }
}
