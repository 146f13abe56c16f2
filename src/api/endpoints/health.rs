//! Liveness, metrics and logout.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Redirect};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, MessageResponse};

/// `GET /ping`
pub async fn ping() -> Json<MessageResponse> {
    Json(MessageResponse::new("pong"))
}

/// `GET /metrics`: Prometheus text exposition.
pub async fn metrics(State(ctx): State<ApiContext>) -> Result<impl IntoResponse, ApiError> {
    let body = ctx
        .core
        .metrics
        .render()
        .map_err(|e| ApiError::Internal(format!("metrics: {e}")))?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// `GET /logout`: tokens are stateless, so this only sends the browser
/// back to the frontend.
pub async fn logout(State(ctx): State<ApiContext>) -> Redirect {
    Redirect::to(&ctx.core.config.frontend_url)
}
