//! Per-client rate limiting for credential endpoints.
//!
//! Sliding windows per client key:
//! - 10 requests per minute
//! - 100 requests per hour

use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

/// Client key: first `X-Forwarded-For` hop, else the peer address, else
/// `anonymous`.
fn rate_key(req: &Request<axum::body::Body>) -> String {
    let forwarded = req
        .headers()
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);
    let peer = || {
        req.extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    };
    forwarded
        .or_else(peer)
        .map(|ip| format!("ip:{ip}"))
        .unwrap_or_else(|| "anonymous".to_string())
}

/// Returns 429 with `Retry-After` once a client exceeds its window.
/// Accesses `ApiContext` from request extensions.
pub async fn limit(req: Request<axum::body::Body>, next: Next) -> Response {
    match limit_inner(req, next).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn limit_inner(req: Request<axum::body::Body>, next: Next) -> Result<Response, ApiError> {
    let ctx: ApiContext = req
        .extensions()
        .get::<ApiContext>()
        .cloned()
        .ok_or(ApiError::Internal("missing API context".into()))?;

    let key = rate_key(&req);

    // MutexGuard is !Send; drop before .await via block scope
    {
        let mut limiter = ctx
            .rate_limiter
            .lock()
            .map_err(|_| ApiError::Internal("rate limiter lock".into()))?;

        if let Err(retry_after) = limiter.check(&key) {
            tracing::warn!(client = %key, retry_after, "Rate limit exceeded");
            return Err(ApiError::RateLimited { retry_after });
        }
    }

    Ok(next.run(req).await)
}
