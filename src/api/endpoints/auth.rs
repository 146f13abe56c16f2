//! Account endpoints: registration, password login, the OTP reset flow
//! and Google sign-in.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Redirect};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, MessageResponse, ValidJson};
use crate::auth::{
    self, ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest,
    VerifyOtpRequest,
};
use crate::mailer;
use crate::oauth::{self, OAuthError};

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub message: String,
}

/// `POST /auth/register`: user or hospital, chosen by `type`.
pub async fn register(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let message = match req {
        RegisterRequest::User(user) => {
            let conn = ctx.core.open_db()?;
            auth::register_user(&conn, &user)?;
            "User registered successfully"
        }
        RegisterRequest::Hospital(hospital) => {
            // Geocoding failure leaves the coordinates empty.
            let point = ctx.core.geocoder.locate(&hospital.address).await;
            let conn = ctx.core.open_db()?;
            auth::register_hospital(&conn, &hospital, point.map(|p| (p.lat, p.lng)))?;
            "Hospital registered successfully"
        }
    };
    Ok((StatusCode::CREATED, Json(MessageResponse::new(message))))
}

/// `POST /auth/login`
pub async fn login(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    let token = auth::login(&conn, &ctx.core.tokens, req.kind, &req.email, &req.password)?;
    Ok(Json(LoginResponse {
        token,
        message: format!("{} logged in successfully", req.kind),
    }))
}

/// `POST /auth/forgot-password`: stores a fresh OTP and mails it.
pub async fn forgot_password(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let (account, otp) = {
        let conn = ctx.core.open_db()?;
        auth::issue_otp(&conn, req.kind, &req.email)?
    };

    let email = mailer::password_reset_otp(&account.email, &otp, auth::OTP_TTL_MINUTES);
    if !mailer::deliver_best_effort(ctx.core.mailer.as_ref(), email).await {
        ctx.core.metrics.email_failed();
        return Err(ApiError::Delivery("Error sending OTP email".into()));
    }
    Ok(Json(MessageResponse::new("OTP sent to email successfully")))
}

/// `POST /auth/verify-otp`
pub async fn verify_otp(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<VerifyOtpRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    auth::verify_otp(&conn, &req.email, &req.otp, req.kind)?;
    Ok(Json(MessageResponse::new("OTP verified successfully")))
}

/// `POST /auth/reset-password`
pub async fn reset_password(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let conn = ctx.core.open_db()?;
    auth::reset_password(&conn, req.kind, &req.email, &req.new_password)?;
    Ok(Json(MessageResponse::new("Password updated successfully")))
}

// ─── Google sign-in ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn issue_state(ctx: &ApiContext) -> Result<String, ApiError> {
    let mut states = ctx
        .oauth_states
        .lock()
        .map_err(|_| ApiError::Internal("oauth state lock".into()))?;
    Ok(states.issue())
}

fn consume_state(ctx: &ApiContext, state: &str) -> Result<bool, ApiError> {
    let mut states = ctx
        .oauth_states
        .lock()
        .map_err(|_| ApiError::Internal("oauth state lock".into()))?;
    Ok(states.consume(state))
}

/// `GET /auth/google`: redirect to the consent screen.
pub async fn google_start(State(ctx): State<ApiContext>) -> Result<Redirect, ApiError> {
    let google = ctx.core.google.as_ref().ok_or(OAuthError::NotConfigured)?;
    let state = issue_state(&ctx)?;
    let url = oauth::authorize_url(&ctx.core.http, &google.config, &state)?;
    Ok(Redirect::to(&url))
}

/// `GET /auth/google/callback`: finish sign-in and hand the token to the
/// frontend window.
pub async fn google_callback(
    State(ctx): State<ApiContext>,
    Query(query): Query<CallbackQuery>,
) -> Result<Html<String>, ApiError> {
    let google = ctx.core.google.as_ref().ok_or(OAuthError::NotConfigured)?;
    if let Some(error) = query.error {
        return Err(OAuthError::Denied(error).into());
    }
    let state_ok = match query.state.as_deref() {
        Some(state) => consume_state(&ctx, state)?,
        None => false,
    };
    if !state_ok {
        return Err(OAuthError::InvalidState.into());
    }
    let code = query
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Missing authorization code".into()))?;

    let profile = google.identity.profile_for_code(&code).await?;
    let token = {
        let conn = ctx.core.open_db()?;
        let (_, token) = oauth::sign_in(&conn, &ctx.core.tokens, &profile)?;
        token
    };
    Ok(Html(oauth::callback_page(&token, &ctx.core.config.frontend_url)))
}
