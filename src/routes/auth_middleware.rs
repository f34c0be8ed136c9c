use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

use crate::models::ErrorResponse;
use crate::services::auth_service::{authenticate, get_auth_token};
use crate::AppState;

/// Authenticate the caller and store an [`AuthUser`](crate::services::auth_service::AuthUser)
/// in the request extensions for downstream handlers
pub async fn auth_middleware(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    // 1. Get the auth token from the request
    let token = match get_auth_token(&req) {
        Ok(token) => token,
        Err(e) => {
            debug!("Rejecting {} {}: {}", req.method(), req.uri().path(), e);
            return ErrorResponse::unauthorized(e).into_response();
        }
    };

    // 2. Validate the token
    let Some(secret) = state.config.auth_jwt_secret.as_deref() else {
        error!("Auth JWT secret not configured");
        return ErrorResponse::server_error("Authentication is not configured").into_response();
    };
    let user = match authenticate(&token, secret) {
        Ok(user) => user,
        Err(e) => {
            warn!("Rejecting {} {}: {}", req.method(), req.uri().path(), e);
            return ErrorResponse::unauthorized(e).into_response();
        }
    };

    // 3. Hand the user to the handlers
    debug!("Request authenticated for {}", user.user_id);
    req.extensions_mut().insert(user);

    next.run(req).await
}
