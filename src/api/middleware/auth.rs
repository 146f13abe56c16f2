//! JWT authentication middleware.
//!
//! Reads the token from `x-auth-token` (or `Authorization: Bearer`),
//! verifies it, and injects [`AuthUser`] into request extensions for
//! downstream handlers.

use axum::http::{HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser};

const NO_TOKEN: &str = "No token, authorization denied";
const BAD_TOKEN: &str = "Token is not valid";

fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("x-auth-token")
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get("Authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Require a valid token.
/// Accesses `ApiContext` from request extensions.
pub async fn require_auth(req: Request<axum::body::Body>, next: Next) -> Response {
    match require_auth_inner(req, next).await {
        Ok(resp) => resp,
        Err(err) => err.into_response(),
    }
}

async fn require_auth_inner(
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let token = token_from_headers(req.headers())
        .ok_or_else(|| ApiError::Unauthorized(NO_TOKEN.into()))?;

    let claims = ctx.core.tokens.verify(token).map_err(|_| {
        tracing::debug!("Rejected token");
        ApiError::Unauthorized(BAD_TOKEN.into())
    })?;

    req.extensions_mut().insert(AuthUser {
        id: claims.user.id,
        kind: claims.user.kind,
    });

    Ok(next.run(req).await)
}
