//! Hospital directory endpoints under `/hospitalapi`.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, ValidJson};
use crate::auth::{self, RegisterHospital};
use crate::booking::{self, SummaryRequest};
use crate::db;
use crate::geocoding::GeoPoint;
use crate::models::{Hospital, HospitalAppointment, ProfileChanges};
use crate::nearby::{self, NearbyHospital};
use crate::profile;

/// `POST /hospitalapi`: same rules as hospital registration.
pub async fn create(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<RegisterHospital>,
) -> Result<(StatusCode, Json<Hospital>), ApiError> {
    let point = ctx.core.geocoder.locate(&req.address).await;
    let conn = ctx.core.open_db()?;
    let hospital = auth::register_hospital(&conn, &req, point.map(|p| (p.lat, p.lng)))?;
    Ok((StatusCode::CREATED, Json(hospital)))
}

/// Search text from `q`, else `search`, else the first parameter that is
/// not paging.
fn search_term(params: &[(String, String)]) -> Option<&str> {
    let named = |key: &str| {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    named("q")
        .or_else(|| named("search"))
        .or_else(|| {
            params
                .iter()
                .find(|(k, _)| k != "page" && k != "limit")
                .map(|(_, v)| v.as_str())
        })
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// `GET /hospitalapi`
pub async fn search(
    State(ctx): State<ApiContext>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Vec<Hospital>>, ApiError> {
    let term = search_term(&params);
    let conn = ctx.core.open_db()?;
    let hospitals = db::search_hospitals(&conn, term)?;
    tracing::debug!(query = term.unwrap_or(""), count = hospitals.len(), "Hospital search");
    Ok(Json(hospitals))
}

#[derive(Debug, Deserialize)]
pub struct AroundQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius: Option<u32>,
}

#[derive(Serialize)]
pub struct AroundResponse {
    pub radius: u32,
    pub hospitals: Vec<NearbyHospital>,
}

/// `GET /hospitalapi/around?lat=&lng=&radius=`
pub async fn around(
    State(ctx): State<ApiContext>,
    Query(query): Query<AroundQuery>,
) -> Result<Json<AroundResponse>, ApiError> {
    let (Some(lat), Some(lng)) = (query.lat, query.lng) else {
        return Err(ApiError::BadRequest("lat and lng are required".into()));
    };
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(ApiError::BadRequest("lat or lng out of range".into()));
    }
    let radius = nearby::clamp_radius(query.radius);
    let hospitals = ctx
        .core
        .locator
        .around(GeoPoint { lat, lng }, radius)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "Nearby hospital lookup failed");
            ApiError::Unavailable("Nearby hospital lookup failed".into())
        })?;
    Ok(Json(AroundResponse { radius, hospitals }))
}

/// `GET /hospitalapi/:id`
pub async fn get(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<Hospital>, ApiError> {
    let conn = ctx.core.open_db()?;
    db::get_hospital(&conn, &id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Hospital not found".into()))
}

/// Coordinates for a changed address. `None` when the address is unchanged
/// or cannot be geocoded, which keeps the stored coordinates.
pub(crate) async fn locate_changed_address(
    ctx: &ApiContext,
    changes: &ProfileChanges,
) -> Option<GeoPoint> {
    match &changes.address {
        Some(address) => ctx.core.geocoder.locate(address).await,
        None => None,
    }
}

/// `PATCH /hospitalapi/:id`: a new address is geocoded again.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(changes): ValidJson<ProfileChanges>,
) -> Result<Json<Hospital>, ApiError> {
    let caller = ctx.caller(&user)?;
    let point = locate_changed_address(&ctx, &changes).await;
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::update_hospital(&conn, &caller, &id, &changes, point)?))
}

/// `DELETE /hospitalapi/:id`
pub async fn remove(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<Hospital>, ApiError> {
    let caller = ctx.caller(&user)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::remove_hospital(&conn, &caller, &id)?))
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub message: &'static str,
    pub appointment: HospitalAppointment,
}

/// `POST /hospitalapi/:id/appointments`
pub async fn push_summary(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
    payload: Result<Json<SummaryRequest>, JsonRejection>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let Json(req) = payload?;
    let conn = ctx.core.open_db()?;
    let appointment = booking::add_hospital_summary(&conn, &id, &req)?;
    Ok(Json(SummaryResponse {
        message: "Appointment added to hospital successfully",
        appointment,
    }))
}
