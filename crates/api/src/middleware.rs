use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use kacaf_auth::JwtValidator;

use crate::app::services::AppServices;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub services: Arc<AppServices>,
}

/// Attach a [`PrincipalContext`] to every request.
///
/// No `Authorization` header means anonymous. A header that is present but
/// malformed, expired, or names an unknown account is rejected with 401.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let context = match extract_bearer(req.headers())? {
        None => PrincipalContext::anonymous(),
        Some(token) => {
            let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
                tracing::debug!(error = %e, "rejected bearer token");
                StatusCode::UNAUTHORIZED
            })?;

            let principal = state
                .services
                .engine()
                .principal(claims.sub)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .ok_or_else(|| {
                    tracing::debug!(principal_id = %claims.sub, "token for unknown principal");
                    StatusCode::UNAUTHORIZED
                })?;

            PrincipalContext::authenticated(principal)
        }
    };

    req.extensions_mut().insert(context);
    Ok(next.run(req).await)
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, StatusCode> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    let header = header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(Some(token))
}
