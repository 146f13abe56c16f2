//! OPD appointment booking.
//!
//! A booking is accepted only when the doctor works at the hospital, the
//! requested slot is the doctor's slot for that weekday, and no active
//! appointment already holds it. The appointment and its summaries are
//! written in one transaction; the partial unique index on
//! `(doctor_id, date, time_slot)` rejects a racing second booking.
//!
//! Everything here is synchronous. Confirmation mail is sent by the caller
//! after commit (see [`BookingOutcome::confirmation`]).

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use base64::Engine;
use chrono::{Datelike, NaiveDate, Utc};
use printpdf::{BuiltinFont, Mm, PdfDocument};
use rusqlite::Connection;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::Caller;
use crate::db::{self, DatabaseError};
use crate::mailer::{self, ConfirmationDetails, Email};
use crate::models::{
    parse_flexible_date, AccountKind, Appointment, AppointmentStatus, HospitalAppointment,
    PatientSnapshot, UserAppointment, EMERGENCY_SLOT,
};

/// Maximum report files per booking.
pub const MAX_REPORTS: usize = 5;
/// Maximum decoded size of one report (4 MB).
pub const MAX_REPORT_BYTES: usize = 4 * 1024 * 1024;

const DEFAULT_SUMMARY_REASON: &str = "OPD Appointment";

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Hospital not found")]
    HospitalNotFound,
    #[error("Doctor not found in selected hospital")]
    DoctorNotInHospital,
    #[error("Doctor not found")]
    DoctorNotFound,
    #[error("Appointment not found")]
    AppointmentNotFound,
    #[error("Selected time slot is not available for this doctor on the selected date")]
    SlotNotOffered,
    #[error("This time slot is already booked")]
    SlotTaken,
    #[error("Invalid date format")]
    InvalidDate,
    #[error("Status must be one of pending, confirmed or canceled")]
    InvalidStatus,
    #[error("Appointment ID is required")]
    MissingAppointmentId,
    #[error("You are not allowed to modify this appointment")]
    Forbidden,
    #[error("{0}")]
    InvalidReport(String),
    #[error("Cannot store report: {0}")]
    Storage(#[from] std::io::Error),
    #[error("Cannot render appointment slip: {0}")]
    Pdf(String),
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

fn slot_conflict(err: DatabaseError) -> BookingError {
    if err.is_unique_violation() {
        BookingError::SlotTaken
    } else {
        BookingError::Database(err)
    }
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

/// Accepts `42` or `"42"`; blank means absent.
fn deserialize_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u32),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Number(n)) => Ok(Some(n)),
        Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(Raw::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom("age must be a whole number")),
    }
}

/// Body of an OPD booking. Missing fields deserialize empty so that
/// validation can name them.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct BookingRequest {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[serde(deserialize_with = "deserialize_age")]
    #[validate(
        required(message = "Age is required"),
        range(min = 1, max = 150, message = "Age must be between 1 and 150")
    )]
    pub age: Option<u32>,
    #[validate(length(min = 1, message = "Gender is required"))]
    pub gender: String,
    #[validate(length(min = 1, message = "Contact is required"))]
    pub contact: String,
    #[validate(length(min = 1, message = "Address is required"))]
    pub address: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Pincode is required"))]
    pub pincode: String,
    #[validate(length(min = 1, message = "Hospital is required"))]
    pub hospital: String,
    #[validate(length(min = 1, message = "Doctor is required"))]
    pub doctor: String,
    #[validate(length(min = 1, message = "Department is required"))]
    pub department: String,
    #[validate(length(min = 5, message = "Reason should be at least 5 characters long"))]
    pub reason: String,
    #[validate(length(min = 1, message = "Date is required"))]
    pub date: String,
    #[validate(length(min = 1, message = "Time slot is required"))]
    pub time_slot: String,
    pub user_id: Option<String>,
    pub hospital_name: Option<String>,
    pub doctor_name: Option<String>,
    /// Base64 data URLs.
    #[validate(length(max = 5, message = "At most 5 reports can be attached"))]
    pub reports: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencyRequest {
    #[serde(alias = "hospitalId")]
    #[validate(length(min = 1, message = "Hospital is required"))]
    pub hospital: String,
    #[serde(alias = "patientName")]
    #[validate(length(min = 1, message = "Patient name is required"))]
    pub name: String,
    #[serde(alias = "patientContact")]
    #[validate(length(min = 1, message = "Contact is required"))]
    pub contact: String,
    #[validate(length(min = 1, message = "Reason is required"))]
    pub reason: String,
    pub department: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAppointmentRequest {
    #[validate(length(min = 1, message = "Date is required"))]
    pub date: String,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
}

/// Body of `POST /hospitalapi/:id/appointments`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SummaryRequest {
    pub appointment_id: Option<String>,
    pub user_id: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub patient_name: Option<String>,
    pub patient_contact: Option<String>,
    pub date: Option<String>,
    pub time_slot: Option<String>,
    pub reason: Option<String>,
    pub status: Option<AppointmentStatus>,
}

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

/// What the client sees after booking.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookedAppointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub hospital: String,
    pub doctor: String,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time_slot: String,
    pub status: AppointmentStatus,
}

#[derive(Debug, Clone)]
pub struct BookingOutcome {
    pub appointment: Appointment,
    pub hospital_name: String,
    pub doctor_name: String,
}

impl BookingOutcome {
    pub fn summary(&self) -> BookedAppointment {
        BookedAppointment {
            id: self.appointment.id.clone(),
            hospital: self.hospital_name.clone(),
            doctor: self.doctor_name.clone(),
            department: self.appointment.department.clone(),
            date: self.appointment.date,
            time_slot: self.appointment.time_slot.clone(),
            status: self.appointment.status,
        }
    }

    /// Confirmation mail for the patient, when an address was given.
    pub fn confirmation(&self) -> Option<Email> {
        let appt = &self.appointment;
        let to = appt.patient.email.as_deref()?;
        let date = appt.date.to_string();
        Some(mailer::appointment_confirmation(
            to,
            &ConfirmationDetails {
                patient_name: &appt.patient.name,
                hospital_name: &self.hospital_name,
                doctor_name: &self.doctor_name,
                department: appt.department.as_deref(),
                date: &date,
                time_slot: &appt.time_slot,
            },
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorRef {
    pub id: String,
    pub name: String,
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HospitalRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor: Option<DoctorRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hospital: Option<HospitalRef>,
    pub slots: Vec<String>,
}

// ═══════════════════════════════════════════════════════════
// Booking
// ═══════════════════════════════════════════════════════════

fn parse_date(raw: &str) -> Result<NaiveDate, BookingError> {
    parse_flexible_date(raw).ok_or(BookingError::InvalidDate)
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn hospital_summary(appt: &Appointment, doctor_name: Option<&str>) -> HospitalAppointment {
    HospitalAppointment {
        id: Uuid::new_v4().to_string(),
        appointment_id: appt.id.clone(),
        user_id: appt.user_id.clone(),
        doctor_id: appt.doctor.clone(),
        doctor_name: doctor_name.map(str::to_string),
        patient_name: Some(appt.patient.name.clone()),
        patient_contact: Some(appt.patient.contact.clone()),
        date: appt.date,
        time_slot: Some(appt.time_slot.clone()),
        reason: appt.reason.clone(),
        status: appt.status,
    }
}

fn user_summary(appt: &Appointment, hospital_name: &str, doctor_name: Option<&str>) -> UserAppointment {
    UserAppointment {
        id: Uuid::new_v4().to_string(),
        appointment_id: appt.id.clone(),
        hospital_id: appt.hospital.clone(),
        hospital_name: hospital_name.to_string(),
        doctor_id: appt.doctor.clone(),
        doctor_name: doctor_name.map(str::to_string),
        department: appt.department.clone(),
        date: appt.date,
        time_slot: Some(appt.time_slot.clone()),
        reason: appt.reason.clone(),
        status: appt.status,
    }
}

/// Insert the appointment and its summaries atomically.
fn persist(
    conn: &mut Connection,
    appt: &Appointment,
    hospital_name: &str,
    doctor_name: Option<&str>,
) -> Result<(), BookingError> {
    let tx = conn.transaction().map_err(DatabaseError::from)?;
    db::insert_appointment(&tx, appt).map_err(slot_conflict)?;
    db::insert_hospital_appointment(&tx, &appt.hospital, &hospital_summary(appt, doctor_name))?;
    if let Some(user_id) = appt.user_id.as_deref() {
        db::insert_user_appointment(&tx, user_id, &user_summary(appt, hospital_name, doctor_name))?;
    }
    tx.commit().map_err(DatabaseError::from)?;
    Ok(())
}

/// Book an OPD slot. The request must already be validated.
pub fn book_appointment(
    conn: &mut Connection,
    req: &BookingRequest,
    reports_dir: &Path,
) -> Result<BookingOutcome, BookingError> {
    let hospital_name =
        db::hospital_name(conn, &req.hospital)?.ok_or(BookingError::HospitalNotFound)?;
    let doctor = db::get_doctor_in_hospital(conn, &req.hospital, &req.doctor)?
        .ok_or(BookingError::DoctorNotInHospital)?;

    let date = parse_date(&req.date)?;
    let time_slot = req.time_slot.trim();
    if !doctor.opd_schedule.offers(date.weekday(), time_slot) {
        return Err(BookingError::SlotNotOffered);
    }
    if db::active_slot_taken(conn, &doctor.id, date, time_slot, None)? {
        return Err(BookingError::SlotTaken);
    }

    let reports = decode_reports(&req.reports)?;

    // Summaries only for accounts that exist; unknown ids book as guests.
    let user_id = match req.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() && db::user_exists(conn, id)? => Some(id.to_string()),
        _ => None,
    };

    let now = Utc::now();
    let mut appt = Appointment {
        id: Uuid::new_v4().to_string(),
        hospital: req.hospital.clone(),
        doctor: Some(doctor.id.clone()),
        user_id,
        department: non_blank(&req.department),
        reason: req.reason.trim().to_string(),
        date,
        time_slot: time_slot.to_string(),
        status: AppointmentStatus::Pending,
        patient: PatientSnapshot {
            name: req.name.trim().to_string(),
            email: non_blank(&req.email),
            age: req.age,
            gender: non_blank(&req.gender),
            contact: req.contact.trim().to_string(),
            address: non_blank(&req.address),
            city: non_blank(&req.city),
            state: non_blank(&req.state),
            pincode: non_blank(&req.pincode),
        },
        reports: Vec::new(),
        created_at: now,
        updated_at: now,
    };

    let written = write_reports(reports_dir, &appt.id, &reports)?;
    appt.reports = written.iter().map(|p| p.to_string_lossy().into_owned()).collect();

    let display_hospital = req
        .hospital_name
        .as_deref()
        .and_then(non_blank)
        .unwrap_or(hospital_name);
    let display_doctor = req
        .doctor_name
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| doctor.name.clone());

    if let Err(e) = persist(conn, &appt, &display_hospital, Some(display_doctor.as_str())) {
        remove_files(&written);
        return Err(e);
    }

    tracing::info!(
        appointment_id = %appt.id,
        hospital_id = %appt.hospital,
        doctor_id = %doctor.id,
        date = %appt.date,
        reports = appt.reports.len(),
        "Appointment booked"
    );
    Ok(BookingOutcome {
        appointment: appt,
        hospital_name: display_hospital,
        doctor_name: display_doctor,
    })
}

/// Same as [`book_appointment`] with the hospital taken from the path.
pub fn book_for_hospital(
    conn: &mut Connection,
    hospital_id: &str,
    req: BookingRequest,
    reports_dir: &Path,
) -> Result<BookingOutcome, BookingError> {
    let req = BookingRequest {
        hospital: hospital_id.to_string(),
        ..req
    };
    book_appointment(conn, &req, reports_dir)
}

/// Walk-in emergency: no doctor, no schedule or conflict check, dated today.
pub fn book_emergency(
    conn: &mut Connection,
    req: &EmergencyRequest,
) -> Result<Appointment, BookingError> {
    let hospital_name =
        db::hospital_name(conn, &req.hospital)?.ok_or(BookingError::HospitalNotFound)?;
    let user_id = match req.user_id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() && db::user_exists(conn, id)? => Some(id.to_string()),
        _ => None,
    };

    let now = Utc::now();
    let appt = Appointment {
        id: Uuid::new_v4().to_string(),
        hospital: req.hospital.clone(),
        doctor: None,
        user_id,
        department: req.department.as_deref().and_then(non_blank),
        reason: req.reason.trim().to_string(),
        date: now.date_naive(),
        time_slot: EMERGENCY_SLOT.to_string(),
        status: AppointmentStatus::Pending,
        patient: PatientSnapshot {
            name: req.name.trim().to_string(),
            contact: req.contact.trim().to_string(),
            ..Default::default()
        },
        reports: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    persist(conn, &appt, &hospital_name, None)?;
    tracing::warn!(appointment_id = %appt.id, hospital_id = %appt.hospital, "Emergency appointment");
    Ok(appt)
}

/// The doctor's slot for the weekday of `date`, unless already taken.
pub fn available_slots(
    conn: &Connection,
    doctor_id: &str,
    date: &str,
) -> Result<SlotAvailability, BookingError> {
    let date = parse_date(date)?;
    let (doctor, hospital_id) = db::find_doctor(conn, doctor_id)?.ok_or(BookingError::DoctorNotFound)?;

    let Some(slot) = doctor.opd_schedule.slot_for(date.weekday()) else {
        return Ok(SlotAvailability {
            available: false,
            message: Some("Doctor is not available on this day".into()),
            doctor: None,
            hospital: None,
            slots: Vec::new(),
        });
    };

    let slots = if db::active_slot_taken(conn, &doctor.id, date, slot, None)? {
        Vec::new()
    } else {
        vec![slot.to_string()]
    };
    let hospital_name = db::hospital_name(conn, &hospital_id)?.unwrap_or_default();

    Ok(SlotAvailability {
        available: !slots.is_empty(),
        message: None,
        doctor: Some(DoctorRef {
            id: doctor.id.clone(),
            name: doctor.name.clone(),
            department: doctor.department.clone(),
        }),
        hospital: Some(HospitalRef {
            id: hospital_id,
            name: hospital_name,
        }),
        slots,
    })
}

// ═══════════════════════════════════════════════════════════
// Changes to existing appointments
// ═══════════════════════════════════════════════════════════

fn authorize(caller: &Caller, appt: &Appointment) -> Result<(), BookingError> {
    let owns_hospital = caller.acts_for(AccountKind::Hospital, &appt.hospital);
    let booked_it = appt
        .user_id
        .as_deref()
        .is_some_and(|uid| caller.acts_for(AccountKind::User, uid));
    if owns_hospital || booked_it {
        Ok(())
    } else {
        Err(BookingError::Forbidden)
    }
}

fn load(conn: &Connection, id: &str) -> Result<Appointment, BookingError> {
    db::get_appointment(conn, id)?.ok_or(BookingError::AppointmentNotFound)
}

/// Reschedule or change the status. A move to another date re-runs the
/// schedule check; any change that leaves the appointment active re-runs
/// the conflict check, ignoring the appointment itself.
pub fn update_appointment(
    conn: &mut Connection,
    caller: &Caller,
    id: &str,
    req: &UpdateAppointmentRequest,
) -> Result<Appointment, BookingError> {
    if req.status == AppointmentStatus::Completed {
        return Err(BookingError::InvalidStatus);
    }
    let appt = load(conn, id)?;
    authorize(caller, &appt)?;

    let date = parse_date(&req.date)?;
    let date_changed = date != appt.date;
    let reactivated = !appt.status.is_active() && req.status.is_active();

    if let Some(doctor_id) = appt.doctor.as_deref() {
        if date_changed && req.status.is_active() {
            let doctor = db::get_doctor_in_hospital(conn, &appt.hospital, doctor_id)?
                .ok_or(BookingError::DoctorNotInHospital)?;
            if !doctor.opd_schedule.offers(date.weekday(), &appt.time_slot) {
                return Err(BookingError::SlotNotOffered);
            }
        }
        if req.status.is_active()
            && (date_changed || reactivated)
            && db::active_slot_taken(conn, doctor_id, date, &appt.time_slot, Some(&appt.id))?
        {
            return Err(BookingError::SlotTaken);
        }
    }

    let reason = req
        .reason
        .as_deref()
        .and_then(non_blank)
        .unwrap_or_else(|| appt.reason.clone());

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    db::update_appointment_fields(&tx, id, date, &reason, req.status).map_err(slot_conflict)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(appointment_id = %id, status = %req.status, "Appointment updated");
    load(conn, id)
}

/// Cancel, freeing the slot.
pub fn cancel_appointment(
    conn: &mut Connection,
    caller: &Caller,
    id: &str,
) -> Result<Appointment, BookingError> {
    let appt = load(conn, id)?;
    authorize(caller, &appt)?;

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    db::update_appointment_fields(&tx, id, appt.date, &appt.reason, AppointmentStatus::Canceled)?;
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(appointment_id = %id, "Appointment canceled");
    load(conn, id)
}

/// Appointments of a hospital, newest first.
pub fn list_for_hospital(
    conn: &Connection,
    hospital_id: &str,
) -> Result<Vec<Appointment>, BookingError> {
    if db::hospital_name(conn, hospital_id)?.is_none() {
        return Err(BookingError::HospitalNotFound);
    }
    Ok(db::list_appointments_for_hospital(conn, hospital_id)?)
}

/// Append a hospital-side summary row directly.
pub fn add_hospital_summary(
    conn: &Connection,
    hospital_id: &str,
    req: &SummaryRequest,
) -> Result<HospitalAppointment, BookingError> {
    let appointment_id = req
        .appointment_id
        .as_deref()
        .and_then(non_blank)
        .ok_or(BookingError::MissingAppointmentId)?;
    if db::hospital_name(conn, hospital_id)?.is_none() {
        return Err(BookingError::HospitalNotFound);
    }
    let date = match req.date.as_deref().and_then(non_blank) {
        Some(raw) => parse_date(&raw)?,
        None => Utc::now().date_naive(),
    };
    let summary = HospitalAppointment {
        id: Uuid::new_v4().to_string(),
        appointment_id,
        user_id: req.user_id.clone(),
        doctor_id: req.doctor_id.clone(),
        doctor_name: req.doctor_name.clone(),
        patient_name: req.patient_name.clone(),
        patient_contact: req.patient_contact.clone(),
        date,
        time_slot: req.time_slot.clone(),
        reason: req
            .reason
            .as_deref()
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_SUMMARY_REASON.to_string()),
        status: req.status.unwrap_or(AppointmentStatus::Pending),
    };
    db::insert_hospital_appointment(conn, hospital_id, &summary)?;
    Ok(summary)
}

// ═══════════════════════════════════════════════════════════
// Report uploads
// ═══════════════════════════════════════════════════════════

/// Decode a base64 data URL to raw bytes.
///
/// Handles both `data:application/pdf;base64,...` and raw base64 strings.
fn decode_data_url(data_url: &str) -> Result<Vec<u8>, String> {
    let base64_data = match data_url.find(',') {
        Some(idx) => &data_url[idx + 1..],
        None => data_url,
    };
    base64::engine::general_purpose::STANDARD
        .decode(base64_data.trim())
        .map_err(|e| format!("Base64 decode failed: {e}"))
}

/// File extension from magic bytes.
fn detect_extension(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "jpg"
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        "png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else if bytes.starts_with(b"%PDF-") {
        "pdf"
    } else {
        "bin"
    }
}

fn decode_reports(reports: &[String]) -> Result<Vec<Vec<u8>>, BookingError> {
    if reports.len() > MAX_REPORTS {
        return Err(BookingError::InvalidReport(format!(
            "At most {MAX_REPORTS} reports can be attached"
        )));
    }
    reports
        .iter()
        .enumerate()
        .map(|(i, data)| {
            let bytes = decode_data_url(data)
                .map_err(|e| BookingError::InvalidReport(format!("Report {}: {e}", i + 1)))?;
            if bytes.len() > MAX_REPORT_BYTES {
                return Err(BookingError::InvalidReport(format!(
                    "Report {} exceeds 4 MB size limit ({} bytes)",
                    i + 1,
                    bytes.len()
                )));
            }
            Ok(bytes)
        })
        .collect()
}

fn write_reports(
    dir: &Path,
    appointment_id: &str,
    reports: &[Vec<u8>],
) -> Result<Vec<PathBuf>, BookingError> {
    if reports.is_empty() {
        return Ok(Vec::new());
    }
    std::fs::create_dir_all(dir)?;
    let mut written = Vec::with_capacity(reports.len());
    for (i, bytes) in reports.iter().enumerate() {
        let path = dir.join(format!("{appointment_id}_{}.{}", i + 1, detect_extension(bytes)));
        if let Err(e) = std::fs::write(&path, bytes) {
            remove_files(&written);
            return Err(BookingError::Storage(e));
        }
        written.push(path);
    }
    Ok(written)
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove report file");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Appointment slip
// ═══════════════════════════════════════════════════════════

/// One-page A4 slip with the appointment details.
pub fn render_slip(
    appt: &Appointment,
    hospital_name: &str,
    doctor_name: Option<&str>,
) -> Result<Vec<u8>, BookingError> {
    let (doc, page1, layer1) = PdfDocument::new("Appointment Slip", Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| BookingError::Pdf(format!("font: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| BookingError::Pdf(format!("font: {e}")))?;

    let mut y = Mm(280.0);
    layer.use_text(crate::config::APP_NAME, 18.0, Mm(20.0), y, &bold);
    y -= Mm(9.0);
    layer.use_text("Appointment Slip", 13.0, Mm(20.0), y, &bold);
    y -= Mm(12.0);

    let age = appt.patient.age.map(|a| a.to_string());
    let date = appt.date.format("%d %B %Y (%A)").to_string();
    let rows: [(&str, Option<&str>); 11] = [
        ("Appointment ID", Some(appt.id.as_str())),
        ("Patient", Some(appt.patient.name.as_str())),
        ("Age", age.as_deref()),
        ("Gender", appt.patient.gender.as_deref()),
        ("Contact", Some(appt.patient.contact.as_str())),
        ("Hospital", Some(hospital_name)),
        ("Doctor", doctor_name),
        ("Department", appt.department.as_deref()),
        ("Date", Some(date.as_str())),
        ("Time Slot", Some(appt.time_slot.as_str())),
        ("Status", Some(appt.status.as_str())),
    ];
    for (label, value) in rows {
        let Some(value) = value else { continue };
        layer.use_text(format!("{label}:"), 10.0, Mm(20.0), y, &bold);
        layer.use_text(value, 10.0, Mm(60.0), y, &font);
        y -= Mm(6.5);
    }

    y -= Mm(3.0);
    layer.use_text("Reason:", 10.0, Mm(20.0), y, &bold);
    for line in wrap_text(&appt.reason, 70) {
        layer.use_text(&line, 10.0, Mm(60.0), y, &font);
        y -= Mm(5.0);
    }

    y -= Mm(10.0);
    layer.use_text(
        "Please arrive 15 minutes before your scheduled time and carry this slip.",
        9.0,
        Mm(20.0),
        y,
        &font,
    );

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| BookingError::Pdf(format!("save: {e}")))?;
    buf.into_inner()
        .map_err(|e| BookingError::Pdf(format!("buffer: {e}")))
}

/// Load an appointment with its display names and render its slip.
pub fn appointment_slip(conn: &Connection, id: &str) -> Result<(Appointment, Vec<u8>), BookingError> {
    let appt = load(conn, id)?;
    let hospital_name = db::hospital_name(conn, &appt.hospital)?.unwrap_or_default();
    let doctor_name = match appt.doctor.as_deref() {
        Some(doctor_id) => db::get_doctor_in_hospital(conn, &appt.hospital, doctor_id)?.map(|d| d.name),
        None => None,
    };
    let pdf = render_slip(&appt, &hospital_name, doctor_name.as_deref())?;
    Ok((appt, pdf))
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
