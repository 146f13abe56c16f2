//! Appointment endpoints: OPD booking, availability, rescheduling,
//! cancellation, emergency walk-ins and the printable slip.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthUser, ValidJson};
use crate::booking::{
    self, BookedAppointment, BookingOutcome, BookingRequest, EmergencyRequest, SlotAvailability,
    UpdateAppointmentRequest,
};
use crate::mailer;
use crate::models::{AccountKind, Appointment};

#[derive(Serialize)]
pub struct BookingResponse {
    pub message: &'static str,
    pub appointment: BookedAppointment,
}

#[derive(Serialize)]
pub struct AppointmentResponse {
    pub message: &'static str,
    pub appointment: Appointment,
}

/// Count the booking and send the confirmation; mail failure never fails
/// the request.
async fn after_booking(ctx: &ApiContext, outcome: &BookingOutcome) {
    ctx.core.metrics.appointment_booked();
    if let Some(email) = outcome.confirmation() {
        if !mailer::deliver_best_effort(ctx.core.mailer.as_ref(), email).await {
            ctx.core.metrics.email_failed();
        }
    }
}

fn created(outcome: &BookingOutcome) -> (StatusCode, Json<BookingResponse>) {
    (
        StatusCode::CREATED,
        Json(BookingResponse {
            message: "Appointment created successfully",
            appointment: outcome.summary(),
        }),
    )
}

/// `POST /hospitalapi/appointments/register`
///
/// A user booking without `userId` books for themselves.
pub async fn register(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    ValidJson(mut req): ValidJson<BookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    if req.user_id.is_none() && user.kind == AccountKind::User {
        req.user_id = Some(user.id.clone());
    }
    let outcome = {
        let mut conn = ctx.core.open_db()?;
        booking::book_appointment(&mut conn, &req, &ctx.core.reports_dir())?
    };
    after_booking(&ctx, &outcome).await;
    Ok(created(&outcome))
}

/// `POST /hospitalapi/hospitals/:id/book` and
/// `POST /hospitalapi/appointments/:id`: hospital taken from the path.
pub async fn book_at_hospital(
    State(ctx): State<ApiContext>,
    Path(hospital_id): Path<String>,
    payload: Result<Json<BookingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BookingResponse>), ApiError> {
    let Json(req) = payload?;
    let req = BookingRequest {
        hospital: hospital_id.clone(),
        ..req
    };
    req.validate()?;
    let outcome = {
        let mut conn = ctx.core.open_db()?;
        booking::book_for_hospital(&mut conn, &hospital_id, req, &ctx.core.reports_dir())?
    };
    after_booking(&ctx, &outcome).await;
    Ok(created(&outcome))
}

/// `POST /hospitalapi/emergency`
pub async fn emergency(
    State(ctx): State<ApiContext>,
    ValidJson(req): ValidJson<EmergencyRequest>,
) -> Result<(StatusCode, Json<AppointmentResponse>), ApiError> {
    let mut conn = ctx.core.open_db()?;
    let appointment = booking::book_emergency(&mut conn, &req)?;
    ctx.core.metrics.appointment_booked();
    Ok((
        StatusCode::CREATED,
        Json(AppointmentResponse {
            message: "Emergency appointment created",
            appointment,
        }),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotsQuery {
    pub doctor_id: Option<String>,
    pub date: Option<String>,
}

/// `GET /hospitalapi/appointments/available-slots?doctorId=&date=`
pub async fn available_slots(
    State(ctx): State<ApiContext>,
    Query(query): Query<SlotsQuery>,
) -> Result<Json<SlotAvailability>, ApiError> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(doctor_id), Some(date)) = (present(query.doctor_id), present(query.date)) else {
        return Err(ApiError::BadRequest("Doctor ID and date are required".into()));
    };
    let conn = ctx.core.open_db()?;
    Ok(Json(booking::available_slots(&conn, doctor_id.trim(), date.trim())?))
}

/// `GET /hospitalapi/appointments/:id`: `:id` is the hospital.
pub async fn list_for_hospital(
    State(ctx): State<ApiContext>,
    Path(hospital_id): Path<String>,
) -> Result<Json<Vec<Appointment>>, ApiError> {
    let conn = ctx.core.open_db()?;
    Ok(Json(booking::list_for_hospital(&conn, &hospital_id)?))
}

/// `PUT /hospitalapi/appointments/:id`
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    ValidJson(req): ValidJson<UpdateAppointmentRequest>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let caller = ctx.caller(&user)?;
    let mut conn = ctx.core.open_db()?;
    let appointment = booking::update_appointment(&mut conn, &caller, &id, &req)?;
    Ok(Json(AppointmentResponse {
        message: "Appointment updated successfully",
        appointment,
    }))
}

/// `PATCH /hospitalapi/appointments/:id`
pub async fn cancel(
    State(ctx): State<ApiContext>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<AppointmentResponse>, ApiError> {
    let caller = ctx.caller(&user)?;
    let mut conn = ctx.core.open_db()?;
    let appointment = booking::cancel_appointment(&mut conn, &caller, &id)?;
    Ok(Json(AppointmentResponse {
        message: "Appointment canceled successfully",
        appointment,
    }))
}

/// `GET /hospitalapi/appointments/:id/slip`: PDF download.
pub async fn slip(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let conn = ctx.core.open_db()?;
    let (appointment, pdf) = booking::appointment_slip(&conn, &id)?;
    let disposition = format!("attachment; filename=\"appointment-{}.pdf\"", appointment.id);
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        pdf,
    ))
}
