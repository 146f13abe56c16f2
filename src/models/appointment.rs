use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::AppointmentStatus;

/// Time slot recorded for walk-in emergency bookings.
pub const EMERGENCY_SLOT: &str = "EMERGENCY";

/// Booked appointment with the patient snapshot taken at booking time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub hospital: String,
    pub doctor: Option<String>,
    pub user_id: Option<String>,
    pub department: Option<String>,
    pub reason: String,
    pub date: NaiveDate,
    pub time_slot: String,
    pub status: AppointmentStatus,
    #[serde(flatten)]
    pub patient: PatientSnapshot,
    pub reports: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSnapshot {
    pub name: String,
    pub email: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub contact: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub pincode: Option<String>,
}
