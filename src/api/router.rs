//! HTTP router.
//!
//! Returns a composable `Router` with every MedSpace route mounted at the
//! root.
//!
//! Middleware stack (outermost → innermost):
//! 1. Extension(ApiContext) → 2. CORS → 3. Security headers →
//! 4. Access log → 5. Rate limit (credential routes) → 6. Auth (protected routes)

use std::sync::Arc;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, ORIGIN};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::from_fn;
use axum::routing::{get, patch, post, put, MethodRouter};
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints::{appointments, auth, health, hospitals, profile, subscribe};
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::core_state::CoreState;

const X_AUTH_TOKEN: HeaderName = HeaderName::from_static("x-auth-token");

/// Response headers added to every reply unless a handler set them.
const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("x-dns-prefetch-control", "off"),
    ("cross-origin-opener-policy", "same-origin"),
    ("x-download-options", "noopen"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer).
/// Endpoint handlers use `State<ApiContext>` (provided via `with_state`).
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Requires a valid token before the handler runs.
fn authed(route: MethodRouter<ApiContext>) -> MethodRouter<ApiContext> {
    route.route_layer(from_fn(middleware::auth::require_auth))
}

/// Credential endpoints share one per-client budget.
fn limited(route: MethodRouter<ApiContext>) -> MethodRouter<ApiContext> {
    route.route_layer(from_fn(middleware::rate::limit))
}

fn cors_layer(allowed: &[String]) -> CorsLayer {
    let allowed: Vec<String> = allowed.to_vec();
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
            origin.to_str().is_ok_and(|origin| {
                origin.contains("localhost") || allowed.iter().any(|o| o == origin)
            })
        }))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION, X_AUTH_TOKEN, ORIGIN, ACCEPT])
        .expose_headers([CONTENT_TYPE, AUTHORIZATION, X_AUTH_TOKEN])
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    let mut router = Router::new()
        .route("/ping", get(health::ping))
        .route("/metrics", get(health::metrics))
        .route("/logout", get(health::logout))
        .route("/profile", authed(get(profile::greeting)))
        // Accounts
        .route("/auth/register", post(auth::register))
        .route("/auth/login", limited(post(auth::login)))
        .route("/auth/forgot-password", limited(post(auth::forgot_password)))
        .route("/auth/verify-otp", limited(post(auth::verify_otp)))
        .route("/auth/reset-password", limited(post(auth::reset_password)))
        .route("/auth/google", get(auth::google_start))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/auth/profile", authed(get(profile::me)))
        .route(
            "/auth/profile/edit/:id",
            authed(post(profile::edit).put(profile::edit)),
        )
        .route("/auth/profile/adddoctor", authed(post(profile::add_doctor)))
        .route("/auth/doctors", get(profile::doctors))
        .route("/auth/nurses", get(profile::nurses))
        // Hospitals
        .route("/hospitalapi", post(hospitals::create).get(hospitals::search))
        .route("/hospitalapi/around", get(hospitals::around))
        .route("/hospitalapi/emergency", post(appointments::emergency))
        .route(
            "/hospitalapi/:id",
            get(hospitals::get).merge(authed(
                patch(hospitals::update).delete(hospitals::remove),
            )),
        )
        .route("/hospitalapi/:id/appointments", post(hospitals::push_summary))
        // Appointments
        .route(
            "/hospitalapi/hospitals/:id/book",
            post(appointments::book_at_hospital),
        )
        .route(
            "/hospitalapi/appointments/register",
            authed(post(appointments::register)),
        )
        .route(
            "/hospitalapi/appointments/available-slots",
            authed(get(appointments::available_slots)),
        )
        .route(
            "/hospitalapi/appointments/:id",
            get(appointments::list_for_hospital)
                .post(appointments::book_at_hospital)
                .merge(authed(
                    put(appointments::update).patch(appointments::cancel),
                )),
        )
        .route("/hospitalapi/appointments/:id/slip", get(appointments::slip))
        .route("/otherroutes/subscribe", post(subscribe::subscribe))
        .layer(from_fn(middleware::access::log_access));

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router
        .layer(cors_layer(&ctx.core.config.allowed_origins))
        // Extension must be outermost so middleware can extract ApiContext
        .layer(axum::Extension(ctx.clone()))
        .with_state(ctx)
}
