//! API error type with structured JSON responses.

use std::collections::BTreeMap;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use validator::ValidationErrors;

use crate::auth::AuthError;
use crate::booking::BookingError;
use crate::db::DatabaseError;
use crate::oauth::OAuthError;
use crate::profile::ProfileError;

/// JSON error body: `{ message, code, errors? }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, Vec<String>>>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Validation error")]
    Validation(#[from] ValidationErrors),
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: u64 },
    #[error("Unavailable: {0}")]
    Unavailable(String),
    /// An outbound delivery the request depends on failed (500, message shown).
    #[error("Delivery failed: {0}")]
    Delivery(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Field name → messages, falling back to the validator code when a rule
/// carries no message.
fn field_messages(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    let mut out = BTreeMap::new();
    collect_field_messages(errors, "", &mut out);
    out
}

fn collect_field_messages(
    errors: &ValidationErrors,
    prefix: &str,
    out: &mut BTreeMap<String, Vec<String>>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let name = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                let messages = list
                    .iter()
                    .map(|e| {
                        e.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| e.code.to_string())
                    })
                    .collect();
                out.insert(name, messages);
            }
            ValidationErrorsKind::Struct(nested) => collect_field_messages(nested, &name, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_field_messages(nested, &format!("{name}[{index}]"), out);
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, errors) = match &self {
            ApiError::Validation(errors) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION",
                "Validation error".to_string(),
                Some(field_messages(errors)),
            ),
            ApiError::BadRequest(detail) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone(), None)
            }
            ApiError::Unauthorized(detail) => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                detail.clone(),
                None,
            ),
            ApiError::Forbidden(detail) => {
                (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone(), None)
            }
            ApiError::NotFound(detail) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone(), None)
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone(), None),
            ApiError::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                format!("Too many requests. Retry after {retry_after}s"),
                None,
            ),
            ApiError::Unavailable(detail) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                detail.clone(),
                None,
            ),
            ApiError::Delivery(detail) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DELIVERY_FAILED",
                detail.clone(),
                None,
            ),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "Server error".to_string(),
                    None,
                )
            }
        };

        let body = ErrorBody {
            message,
            code,
            errors,
        };

        let mut response = (status, Json(body)).into_response();
        if let ApiError::RateLimited { retry_after } = &self {
            if let Ok(val) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert("Retry-After", val);
            }
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound { entity_type, .. } => {
                ApiError::NotFound(format!("{entity_type} not found"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidOtp | AuthError::ResetNotAllowed => {
                ApiError::BadRequest(err.to_string())
            }
            AuthError::EmailTaken => ApiError::Conflict(err.to_string()),
            AuthError::AccountNotFound(_) => ApiError::NotFound(err.to_string()),
            AuthError::InvalidToken => ApiError::Unauthorized(err.to_string()),
            AuthError::Database(e) => e.into(),
            AuthError::Hash(_) | AuthError::Signing(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::HospitalNotFound
            | BookingError::DoctorNotInHospital
            | BookingError::DoctorNotFound
            | BookingError::AppointmentNotFound => ApiError::NotFound(err.to_string()),
            BookingError::SlotNotOffered
            | BookingError::SlotTaken
            | BookingError::InvalidDate
            | BookingError::InvalidStatus
            | BookingError::MissingAppointmentId
            | BookingError::InvalidReport(_) => ApiError::BadRequest(err.to_string()),
            BookingError::Forbidden => ApiError::Forbidden(err.to_string()),
            BookingError::Database(e) => e.into(),
            BookingError::Storage(_) | BookingError::Pdf(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::NotConfigured => ApiError::Unavailable(err.to_string()),
            OAuthError::InvalidState | OAuthError::Denied(_) | OAuthError::MissingEmail => {
                ApiError::BadRequest(err.to_string())
            }
            OAuthError::Auth(e) => e.into(),
            OAuthError::Http(e) => {
                tracing::warn!(error = %e, "Google sign-in request failed");
                ApiError::Internal("Error signing in with Google".into())
            }
        }
    }
}

impl From<ProfileError> for ApiError {
    fn from(err: ProfileError) -> Self {
        match err {
            ProfileError::ProfileNotFound
            | ProfileError::AccountNotFound
            | ProfileError::HospitalNotFound => ApiError::NotFound(err.to_string()),
            ProfileError::Forbidden => ApiError::Forbidden(err.to_string()),
            ProfileError::MissingDoctor
            | ProfileError::IncompleteDoctor
            | ProfileError::DoctorExists => ApiError::BadRequest(err.to_string()),
            ProfileError::Database(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use validator::Validate;

    async fn body_json(response: Response) -> serde_json::Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401_with_message() {
        let response = ApiError::Unauthorized("No token, authorization denied".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["code"], "AUTH_REQUIRED");
        assert_eq!(json["message"], "No token, authorization denied");
    }

    #[tokio::test]
    async fn rate_limited_returns_429_with_retry_after() {
        let response = ApiError::RateLimited { retry_after: 60 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get("Retry-After").unwrap(), "60");
        let json = body_json(response).await;
        assert_eq!(json["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn internal_hides_detail() {
        let response = ApiError::Internal("disk I/O error at /var/db".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Server error");
        assert!(json.get("errors").is_none());
    }

    #[tokio::test]
    async fn validation_lists_field_messages() {
        #[derive(Validate)]
        struct Probe {
            #[validate(email(message = "Invalid email address"))]
            email: String,
        }
        let errors = Probe {
            email: "nope".into(),
        }
        .validate()
        .unwrap_err();

        let response = ApiError::from(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["code"], "VALIDATION");
        assert_eq!(json["errors"]["email"][0], "Invalid email address");
    }

    #[test]
    fn auth_errors_map_to_statuses() {
        let status = |e: AuthError| ApiError::from(e).into_response().status();
        assert_eq!(status(AuthError::InvalidCredentials), StatusCode::BAD_REQUEST);
        assert_eq!(status(AuthError::EmailTaken), StatusCode::CONFLICT);
        assert_eq!(status(AuthError::AccountNotFound("User")), StatusCode::NOT_FOUND);
        assert_eq!(status(AuthError::InvalidToken), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn booking_errors_map_to_statuses() {
        let status = |e: BookingError| ApiError::from(e).into_response().status();
        assert_eq!(status(BookingError::SlotTaken), StatusCode::BAD_REQUEST);
        assert_eq!(status(BookingError::DoctorNotInHospital), StatusCode::NOT_FOUND);
        assert_eq!(status(BookingError::Forbidden), StatusCode::FORBIDDEN);
        assert_eq!(
            status(BookingError::Pdf("font".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn missing_google_config_is_503() {
        let status = ApiError::from(OAuthError::NotConfigured).into_response().status();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
