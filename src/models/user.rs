use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AppointmentStatus, Gender};
use super::Address;

/// Patient account as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Address,
    pub medical_history: Vec<String>,
    pub is_admin: bool,
    pub appointments: Vec<UserAppointment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalised appointment row attached to a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAppointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub appointment_id: String,
    pub hospital_id: String,
    pub hospital_name: String,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub department: Option<String>,
    pub date: NaiveDate,
    pub time_slot: Option<String>,
    pub reason: String,
    pub status: AppointmentStatus,
}
