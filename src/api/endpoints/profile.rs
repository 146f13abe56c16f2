//! Profile and doctor roster endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::{Extension, Json};

use crate::api::endpoints::hospitals;
use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, ValidJson};
use crate::db;
use crate::models::{DoctorListing, Hospital, ProfileChanges};
use crate::profile::{self, Account, AddDoctorRequest, Greeting, ProfileView};

/// `GET /auth/profile`
pub async fn me(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ProfileView>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::load_profile(&conn, &user.id, user.kind)?))
}

/// `POST|PUT /auth/profile/edit/:id`: a hospital's new address is geocoded
/// again, as in `PATCH /hospitalapi/:id`.
pub async fn edit(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(changes): ValidJson<ProfileChanges>,
) -> Result<Json<Account>, ApiError> {
    let caller = ctx.caller(&user)?;
    let is_hospital = {
        let conn = ctx.core.open_db()?;
        db::hospital_name(&conn, &id)?.is_some()
    };
    let point = if is_hospital {
        hospitals::locate_changed_address(&ctx, &changes).await
    } else {
        None
    };
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::edit_profile(&conn, &caller, &id, &changes, point)?))
}

/// `POST /auth/profile/adddoctor`: the hospital comes from the token.
pub async fn add_doctor(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<AddDoctorRequest>, JsonRejection>,
) -> Result<Json<Hospital>, ApiError> {
    let Json(req) = payload?;
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::add_doctor(&conn, &user.id, &req)?))
}

/// `GET /auth/doctors`
pub async fn doctors(State(ctx): State<ApiContext>) -> Result<Json<Vec<DoctorListing>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(db::list_all_doctors(&conn)?))
}

/// `GET /auth/nurses`
pub async fn nurses(State(ctx): State<ApiContext>) -> Result<Json<Vec<DoctorListing>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::list_nurses(&conn)?))
}

/// `GET /profile`
pub async fn greeting(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Greeting>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(profile::greeting(&conn, &user.id, user.kind)?))
}
