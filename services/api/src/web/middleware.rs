//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

use crate::web::state::AppState;

/// The owner identity of an authenticated request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity(pub String);

/// Pulls the auth token from the `session` cookie or an `Authorization: Bearer` header.
pub fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let from_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session="))
        });

    from_cookie
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Middleware that resolves the request's auth token to an owner identity.
///
/// If valid, inserts the `Identity` into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = extract_token(req.headers())
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_string();

    let owner_uid = state.identity.resolve_identity(&token).await.map_err(|e| {
        warn!("Failed to resolve identity: {:?}", e);
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(Identity(owner_uid));
    Ok(next.run(req).await)
}
