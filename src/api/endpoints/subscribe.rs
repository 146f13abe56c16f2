//! Newsletter subscription under `/otherroutes`.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, MessageResponse, ValidJson};
use crate::auth::normalize_email;
use crate::db;
use crate::mailer;

#[derive(Debug, Deserialize, Validate)]
pub struct SubscribeRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

/// `POST /otherroutes/subscribe`
pub async fn subscribe(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<SubscribeRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let email = normalize_email(&req.email);
    {
        let conn = ctx.core.open_db()?;
        db::insert_subscriber(&conn, &email).map_err(|e| {
            if e.is_unique_violation() {
                ApiError::Conflict("Email already subscribed".into())
            } else {
                e.into()
            }
        })?;
    }
    tracing::info!("Newsletter subscription added");

    if !mailer::deliver_best_effort(ctx.core.mailer.as_ref(), mailer::newsletter_welcome(&email)).await {
        ctx.core.metrics.email_failed();
    }
    Ok((StatusCode::CREATED, Json(MessageResponse::new("Subscribed successfully"))))
}
