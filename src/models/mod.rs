pub mod appointment;
pub mod enums;
pub mod hospital;
pub mod user;

pub use appointment::*;
pub use enums::*;
pub use hospital::*;
pub use user::*;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp (date part kept).
pub fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// Serde adapter for optional dates sent in either accepted format.
pub fn deserialize_optional_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_flexible_date(value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid date: {value}"))),
    }
}

/// Editable profile fields. Identity fields (`_id`, `email`, `password`)
/// are not part of it, so clients sending them have no effect.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    #[validate(length(min = 2, message = "Name must be at least 2 characters"))]
    pub name: Option<String>,
    #[validate(length(min = 10, max = 15, message = "Phone must be 10 to 15 digits"))]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    #[validate(nested)]
    pub address: Option<Address>,
    pub medical_history: Option<Vec<String>>,
    #[validate(url(message = "Website must be a valid URL"))]
    pub website: Option<String>,
    #[serde(alias = "department")]
    pub departments: Option<Vec<String>>,
    pub available_services: Option<Vec<String>>,
    #[validate(range(min = 0.0, max = 5.0, message = "Ratings must be between 0 and 5"))]
    pub ratings: Option<f64>,
}

/// Postal address shared by users, hospitals and registration payloads.
/// Missing keys deserialize to empty strings so validation reports them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    #[validate(length(min = 1, message = "Street is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "City is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "State is required"))]
    pub state: String,
    #[validate(length(min = 1, message = "Postal code is required"))]
    pub postal_code: String,
}

impl Address {
    pub fn has_any(&self) -> bool {
        [&self.street, &self.city, &self.state, &self.postal_code]
            .iter()
            .any(|part| !part.trim().is_empty())
    }
}

/// Secret columns for an account. Never serialized.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub kind: AccountKind,
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub otp_hash: Option<Vec<u8>>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub reset_allowed_until: Option<DateTime<Utc>>,
}
