//! Access log and request metrics.
//!
//! Logs every request with method, matched route, status and latency,
//! and records the same labels in the Prometheus registry. The matched
//! route template is used instead of the raw path to keep label
//! cardinality bounded.

use std::time::Instant;

use axum::extract::MatchedPath;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::ApiContext;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let ctx = req.extensions().get::<ApiContext>().cloned();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let elapsed = started.elapsed();
    if status >= 500 {
        tracing::warn!(%method, %route, status, latency_ms = elapsed.as_millis() as u64, "Request failed");
    } else {
        tracing::info!(%method, %route, status, latency_ms = elapsed.as_millis() as u64, "Request");
    }
    if let Some(ctx) = ctx {
        ctx.core.metrics.observe_request(&method, &route, status, elapsed);
    }

    response
}
