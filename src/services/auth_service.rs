use axum::extract::Query;
use axum::http::{self, HeaderMap, Uri};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::Deserialize;
use tracing::debug;

/// The identified caller of a request or connection
#[derive(Clone, Debug, PartialEq)]
pub struct AuthUser {
    /// Display identifier: the email claim, or the subject when there is none
    pub user_id: String,
    pub subject: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    get_auth_token_from(req.headers(), req.uri())
}

/// Look for a token in the Authorization header, the auth_token cookie and
/// finally the `token` query parameter. Browsers cannot set headers on a
/// WebSocket upgrade, which is why the query parameter is accepted.
pub fn get_auth_token_from(headers: &HeaderMap, uri: &Uri) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(http::header::COOKIE) {
        let cookie_str = cookie_header.to_str().map_err(|_| "Invalid Cookie header".to_string())?;
        for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
            if cookie.name() == "auth_token" {
                return Ok(cookie.value().to_string());
            }
        }
    }

    // 3. Try the query string
    if let Ok(Query(query)) = Query::<TokenQuery>::try_from_uri(uri) {
        if let Some(token) = query.token.filter(|t| !t.is_empty()) {
            return Ok(token);
        }
    }

    Err("Missing Authorization header, auth_token cookie or token parameter".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Validate the token and extract the caller's identity
pub fn authenticate(token: &str, secret: &str) -> Result<AuthUser, String> {
    let token_data = validate_jwt(token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    let subject = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let email = token_data
        .claims
        .get("email")
        .and_then(|v| v.as_str())
        .map(str::to_string);

    match (email, subject) {
        (Some(email), Some(sub)) => Ok(AuthUser { user_id: email, subject: sub }),
        (Some(email), None) => Ok(AuthUser { user_id: email.clone(), subject: email }),
        (None, Some(sub)) => Ok(AuthUser { user_id: sub.clone(), subject: sub }),
        (None, None) => {
            debug!("JWT token carries neither 'email' nor 'sub'");
            Err("Can't extract a user from the JWT token".to_string())
        }
    }
}
