use chrono::{DateTime, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};

use super::enums::AppointmentStatus;
use super::Address;

/// Schedule value meaning the doctor has no OPD that day.
pub const NOT_AVAILABLE: &str = "Not Available";

/// Hospital account as returned to clients. Secrets are never part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hospital {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub website: Option<String>,
    pub address: Address,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub departments: Vec<String>,
    pub available_services: Vec<String>,
    pub ratings: Option<f64>,
    pub doctors: Vec<Doctor>,
    pub appointments: Vec<HospitalAppointment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Doctor {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub department: String,
    pub phone: Option<String>,
    pub opd_schedule: OpdSchedule,
}

/// Weekly OPD slot per day. `None` (or "Not Available") means no OPD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpdSchedule {
    pub monday: Option<String>,
    pub tuesday: Option<String>,
    pub wednesday: Option<String>,
    pub thursday: Option<String>,
    pub friday: Option<String>,
    pub saturday: Option<String>,
    pub sunday: Option<String>,
}

impl OpdSchedule {
    /// The slot offered on `day`, if any.
    pub fn slot_for(&self, day: Weekday) -> Option<&str> {
        let raw = match day {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        };
        raw.as_deref()
            .map(str::trim)
            .filter(|slot| !slot.is_empty() && *slot != NOT_AVAILABLE)
    }

    /// Exact (trimmed) match between the weekday slot and the requested one.
    pub fn offers(&self, day: Weekday, time_slot: &str) -> bool {
        self.slot_for(day) == Some(time_slot.trim())
    }
}

/// Doctor plus the hospital it belongs to, for public listings.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoctorListing {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub hospital_id: String,
    pub hospital_name: String,
}

/// Denormalised appointment row attached to a hospital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalAppointment {
    #[serde(rename = "_id")]
    pub id: String,
    pub appointment_id: String,
    pub user_id: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub patient_name: Option<String>,
    pub patient_contact: Option<String>,
    pub date: NaiveDate,
    pub time_slot: Option<String>,
    pub reason: String,
    pub status: AppointmentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule() -> OpdSchedule {
        OpdSchedule {
            monday: Some("10:00 AM - 12:00 PM".into()),
            tuesday: Some(NOT_AVAILABLE.into()),
            wednesday: Some("  02:00 PM - 04:00 PM ".into()),
            ..Default::default()
        }
    }

    #[test]
    fn slot_for_returns_trimmed_slot() {
        let s = schedule();
        assert_eq!(s.slot_for(Weekday::Mon), Some("10:00 AM - 12:00 PM"));
        assert_eq!(s.slot_for(Weekday::Wed), Some("02:00 PM - 04:00 PM"));
    }

    #[test]
    fn not_available_and_null_mean_no_slot() {
        let s = schedule();
        assert_eq!(s.slot_for(Weekday::Tue), None);
        assert_eq!(s.slot_for(Weekday::Sun), None);
    }

    #[test]
    fn offers_requires_exact_match() {
        let s = schedule();
        assert!(s.offers(Weekday::Mon, "10:00 AM - 12:00 PM"));
        assert!(s.offers(Weekday::Wed, "02:00 PM - 04:00 PM"));
        assert!(!s.offers(Weekday::Mon, "10:00 AM"));
        assert!(!s.offers(Weekday::Tue, NOT_AVAILABLE));
    }

    #[test]
    fn schedule_deserializes_with_missing_days() {
        let s: OpdSchedule = serde_json::from_str(r#"{"friday":"09:00 AM - 11:00 AM"}"#).unwrap();
        assert_eq!(s.slot_for(Weekday::Fri), Some("09:00 AM - 11:00 AM"));
        assert_eq!(s.monday, None);
    }
}
