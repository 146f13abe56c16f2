//! Account profiles and hospital doctor rosters.
//!
//! Profile reads and edits work on whichever account type owns the id.
//! Edits are limited to the owner of the account or an admin.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Caller;
use crate::db::{self, DatabaseError};
use crate::geocoding::GeoPoint;
use crate::models::{
    AccountKind, Doctor, DoctorListing, Hospital, OpdSchedule, ProfileChanges, User,
};

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile not found")]
    ProfileNotFound,
    #[error("No user or hospital found with the provided ID")]
    AccountNotFound,
    #[error("No hospital found with the provided ID")]
    HospitalNotFound,
    #[error("You are not allowed to modify this profile")]
    Forbidden,
    #[error("Doctor data is required")]
    MissingDoctor,
    #[error("Doctor name and department are required")]
    IncompleteDoctor,
    #[error("Doctor already exists")]
    DoctorExists,
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// A user or a hospital, serialized as the bare account object.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Account {
    User(User),
    Hospital(Hospital),
}

/// `GET /auth/profile` body: the account plus role markers.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    #[serde(flatten)]
    pub account: Account,
    pub role: AccountKind,
    pub is_hospital: bool,
}

/// Profile of the token holder. Embedded appointments come back newest
/// date first from the repository.
pub fn load_profile(
    conn: &Connection,
    id: &str,
    kind: AccountKind,
) -> Result<ProfileView, ProfileError> {
    let account = match kind {
        AccountKind::User => db::get_user(conn, id)?.map(Account::User),
        AccountKind::Hospital => db::get_hospital(conn, id)?.map(Account::Hospital),
    }
    .ok_or(ProfileError::ProfileNotFound)?;
    Ok(ProfileView {
        account,
        role: kind,
        is_hospital: kind == AccountKind::Hospital,
    })
}

/// Apply whitelisted changes to the user or hospital with this id.
/// Changes must already be validated. `point` is the geocoded new address
/// of a hospital; users ignore it.
pub fn edit_profile(
    conn: &Connection,
    caller: &Caller,
    id: &str,
    changes: &ProfileChanges,
    point: Option<GeoPoint>,
) -> Result<Account, ProfileError> {
    if db::user_exists(conn, id)? {
        if !caller.acts_for(AccountKind::User, id) {
            return Err(ProfileError::Forbidden);
        }
        let user = db::update_user_profile(conn, id, changes)?.ok_or(ProfileError::AccountNotFound)?;
        tracing::info!(user_id = %id, "User profile updated");
        return Ok(Account::User(user));
    }
    if db::hospital_name(conn, id)?.is_some() {
        return update_hospital(conn, caller, id, changes, point).map(Account::Hospital);
    }
    Err(ProfileError::AccountNotFound)
}

/// Owner or admin edit of a hospital. A `point` replaces the stored
/// coordinates; `None` keeps them.
pub fn update_hospital(
    conn: &Connection,
    caller: &Caller,
    id: &str,
    changes: &ProfileChanges,
    point: Option<GeoPoint>,
) -> Result<Hospital, ProfileError> {
    if db::hospital_name(conn, id)?.is_none() {
        return Err(ProfileError::HospitalNotFound);
    }
    if !caller.acts_for(AccountKind::Hospital, id) {
        return Err(ProfileError::Forbidden);
    }
    let mut hospital =
        db::update_hospital(conn, id, changes)?.ok_or(ProfileError::HospitalNotFound)?;
    if let Some(point) = point {
        db::set_hospital_coordinates(conn, id, Some(point.lat), Some(point.lng))?;
        hospital.lat = Some(point.lat);
        hospital.long = Some(point.lng);
    }
    tracing::info!(hospital_id = %id, relocated = point.is_some(), "Hospital profile updated");
    Ok(hospital)
}

/// Owner or admin removal of a hospital. Returns what was deleted.
pub fn remove_hospital(
    conn: &Connection,
    caller: &Caller,
    id: &str,
) -> Result<Hospital, ProfileError> {
    if db::hospital_name(conn, id)?.is_none() {
        return Err(ProfileError::HospitalNotFound);
    }
    if !caller.acts_for(AccountKind::Hospital, id) {
        return Err(ProfileError::Forbidden);
    }
    let hospital = db::delete_hospital(conn, id)?.ok_or(ProfileError::HospitalNotFound)?;
    tracing::warn!(hospital_id = %id, "Hospital deleted");
    Ok(hospital)
}

// ═══════════════════════════════════════════════════════════
// Doctors
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DoctorInput {
    pub name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub opd_schedule: OpdSchedule,
}

/// Body of `POST /auth/profile/adddoctor`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddDoctorRequest {
    pub doctor: Option<DoctorInput>,
}

fn clean(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Blank days become `None`; "Not Available" is kept as written.
fn clean_schedule(schedule: &OpdSchedule) -> OpdSchedule {
    let day = |slot: &Option<String>| clean(slot.as_deref());
    OpdSchedule {
        monday: day(&schedule.monday),
        tuesday: day(&schedule.tuesday),
        wednesday: day(&schedule.wednesday),
        thursday: day(&schedule.thursday),
        friday: day(&schedule.friday),
        saturday: day(&schedule.saturday),
        sunday: day(&schedule.sunday),
    }
}

/// Add a doctor to the hospital and return the updated hospital.
pub fn add_doctor(
    conn: &Connection,
    hospital_id: &str,
    req: &AddDoctorRequest,
) -> Result<Hospital, ProfileError> {
    let input = req.doctor.as_ref().ok_or(ProfileError::MissingDoctor)?;
    let (Some(name), Some(department)) = (
        clean(input.name.as_deref()),
        clean(input.department.as_deref()),
    ) else {
        return Err(ProfileError::IncompleteDoctor);
    };
    if db::hospital_name(conn, hospital_id)?.is_none() {
        return Err(ProfileError::HospitalNotFound);
    }
    if db::doctor_name_exists(conn, hospital_id, &name)? {
        return Err(ProfileError::DoctorExists);
    }

    let doctor = Doctor {
        id: Uuid::new_v4().to_string(),
        name,
        department,
        phone: clean(input.phone.as_deref()),
        opd_schedule: clean_schedule(&input.opd_schedule),
    };
    db::insert_doctor(conn, hospital_id, &doctor).map_err(|e| {
        if e.is_unique_violation() {
            ProfileError::DoctorExists
        } else {
            ProfileError::Database(e)
        }
    })?;
    tracing::info!(
        hospital_id = %hospital_id,
        doctor_id = %doctor.id,
        "Doctor added"
    );
    db::get_hospital(conn, hospital_id)?.ok_or(ProfileError::HospitalNotFound)
}

/// Doctors whose department mentions nursing.
pub fn list_nurses(conn: &Connection) -> Result<Vec<DoctorListing>, ProfileError> {
    Ok(db::list_all_doctors(conn)?
        .into_iter()
        .filter(|d| d.doctor.department.to_lowercase().contains("nurse"))
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Greeting {
    pub msg: String,
}

pub fn greeting(conn: &Connection, id: &str, kind: AccountKind) -> Result<Greeting, ProfileError> {
    let creds = db::get_credentials_by_id(conn, kind, id)?.ok_or(ProfileError::ProfileNotFound)?;
    Ok(Greeting {
        msg: format!("Hello, {}. Your email is {}", creds.name, creds.email),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tests::{hospital_request, user_request};
    use crate::auth::{register_hospital, register_user};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Address;

    fn owner(kind: AccountKind, id: &str) -> Caller {
        Caller {
            id: id.into(),
            kind,
            is_admin: false,
        }
    }

    fn doctor(name: &str, department: &str) -> AddDoctorRequest {
        AddDoctorRequest {
            doctor: Some(DoctorInput {
                name: Some(name.into()),
                department: Some(department.into()),
                phone: Some(" ".into()),
                opd_schedule: OpdSchedule {
                    monday: Some("10:00 AM - 12:00 PM".into()),
                    friday: Some("".into()),
                    ..Default::default()
                },
            }),
        }
    }

    #[test]
    fn profile_view_marks_role() {
        let conn = open_memory_database().unwrap();
        let user = register_user(&conn, &user_request("u@example.com")).unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();

        let view = load_profile(&conn, &user.id, AccountKind::User).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["isHospital"], false);
        assert_eq!(json["email"], "u@example.com");
        assert!(json.get("password").is_none());
        assert!(json.get("passwordHash").is_none());

        let view = load_profile(&conn, &hospital.id, AccountKind::Hospital).unwrap();
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["role"], "hospital");
        assert_eq!(json["isHospital"], true);
        assert!(json["doctors"].is_array());

        assert!(matches!(
            load_profile(&conn, &user.id, AccountKind::Hospital),
            Err(ProfileError::ProfileNotFound)
        ));
    }

    #[test]
    fn edit_requires_owner_or_admin() {
        let conn = open_memory_database().unwrap();
        let user = register_user(&conn, &user_request("u@example.com")).unwrap();
        let changes = ProfileChanges {
            name: Some("Asha P".into()),
            ..Default::default()
        };

        let stranger = owner(AccountKind::User, "someone-else");
        assert!(matches!(
            edit_profile(&conn, &stranger, &user.id, &changes, None),
            Err(ProfileError::Forbidden)
        ));

        let admin = Caller {
            is_admin: true,
            ..stranger
        };
        let Account::User(updated) = edit_profile(&conn, &admin, &user.id, &changes, None).unwrap() else {
            panic!("expected a user");
        };
        assert_eq!(updated.name, "Asha P");

        assert!(matches!(
            edit_profile(&conn, &admin, "missing", &changes, None),
            Err(ProfileError::AccountNotFound)
        ));
    }

    #[test]
    fn hospital_owner_can_edit_and_delete() {
        let conn = open_memory_database().unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();
        let me = owner(AccountKind::Hospital, &hospital.id);
        let changes = ProfileChanges {
            address: Some(Address {
                street: "Baner Road".into(),
                city: "Pune".into(),
                state: "Maharashtra".into(),
                postal_code: "411045".into(),
            }),
            ..Default::default()
        };

        let baner = GeoPoint {
            lat: 18.559,
            lng: 73.7868,
        };
        let Account::Hospital(updated) =
            edit_profile(&conn, &me, &hospital.id, &changes, Some(baner)).unwrap()
        else {
            panic!("expected a hospital");
        };
        assert_eq!(updated.address.street, "Baner Road");
        assert_eq!((updated.lat, updated.long), (Some(18.559), Some(73.7868)));
        let stored = db::get_hospital(&conn, &hospital.id).unwrap().unwrap();
        assert_eq!((stored.lat, stored.long), (Some(18.559), Some(73.7868)));

        let other = owner(AccountKind::Hospital, "other");
        assert!(matches!(
            remove_hospital(&conn, &other, &hospital.id),
            Err(ProfileError::Forbidden)
        ));
        let deleted = remove_hospital(&conn, &me, &hospital.id).unwrap();
        assert_eq!(deleted.id, hospital.id);
        assert!(db::get_hospital(&conn, &hospital.id).unwrap().is_none());
    }

    #[test]
    fn add_doctor_cleans_input_and_rejects_duplicates() {
        let conn = open_memory_database().unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();

        let updated = add_doctor(&conn, &hospital.id, &doctor(" Dr. Kale ", "Orthopedics")).unwrap();
        assert_eq!(updated.doctors.len(), 1);
        let added = &updated.doctors[0];
        assert_eq!(added.name, "Dr. Kale");
        assert_eq!(added.phone, None);
        assert_eq!(added.opd_schedule.friday, None);
        assert_eq!(added.opd_schedule.monday.as_deref(), Some("10:00 AM - 12:00 PM"));

        let err = add_doctor(&conn, &hospital.id, &doctor("Dr. Kale", "ENT")).unwrap_err();
        assert_eq!(err.to_string(), "Doctor already exists");
    }

    #[test]
    fn failed_geocode_keeps_stored_coordinates() {
        let conn = open_memory_database().unwrap();
        let hospital =
            register_hospital(&conn, &hospital_request("h@example.com"), Some((18.53, 73.87)))
                .unwrap();
        let me = owner(AccountKind::Hospital, &hospital.id);
        let changes = ProfileChanges {
            phone: Some("02066455199".into()),
            ..Default::default()
        };

        let updated = update_hospital(&conn, &me, &hospital.id, &changes, None).unwrap();
        assert_eq!(updated.phone, "02066455199");
        assert_eq!((updated.lat, updated.long), (Some(18.53), Some(73.87)));
    }

    #[test]
    fn racing_duplicate_doctor_is_reported_as_existing() {
        let conn = open_memory_database().unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();
        // A concurrent request commits the same doctor between the existence
        // check and this insert.
        conn.execute_batch(
            "CREATE TEMP TRIGGER concurrent_add BEFORE INSERT ON doctors
             WHEN NEW.name = 'Dr. Kale'
              AND NOT EXISTS (SELECT 1 FROM doctors WHERE name = 'Dr. Kale')
             BEGIN
               INSERT INTO doctors (id, hospital_id, name, department, created_at)
               VALUES ('other-request', NEW.hospital_id, NEW.name, NEW.department, datetime('now'));
             END;",
        )
        .unwrap();

        let err = add_doctor(&conn, &hospital.id, &doctor("Dr. Kale", "Orthopedics")).unwrap_err();
        assert!(matches!(err, ProfileError::DoctorExists));
    }

    #[test]
    fn add_doctor_validates_payload() {
        let conn = open_memory_database().unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();

        assert!(matches!(
            add_doctor(&conn, &hospital.id, &AddDoctorRequest::default()),
            Err(ProfileError::MissingDoctor)
        ));
        assert!(matches!(
            add_doctor(&conn, &hospital.id, &doctor("Dr. X", " ")),
            Err(ProfileError::IncompleteDoctor)
        ));
        assert!(matches!(
            add_doctor(&conn, "missing", &doctor("Dr. X", "ENT")),
            Err(ProfileError::HospitalNotFound)
        ));
    }

    #[test]
    fn nurses_filter_on_department() {
        let conn = open_memory_database().unwrap();
        let hospital = register_hospital(&conn, &hospital_request("h@example.com"), None).unwrap();
        add_doctor(&conn, &hospital.id, &doctor("Sister Anne", "Nursing Staff")).unwrap();
        add_doctor(&conn, &hospital.id, &doctor("Dr. Kale", "Orthopedics")).unwrap();
        add_doctor(&conn, &hospital.id, &doctor("R. Nair", "ICU Nurse")).unwrap();

        let nurses = list_nurses(&conn).unwrap();
        let names: Vec<&str> = nurses.iter().map(|n| n.doctor.name.as_str()).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"Sister Anne"));
        assert!(names.contains(&"R. Nair"));
    }

    #[test]
    fn greeting_uses_name_and_email() {
        let conn = open_memory_database().unwrap();
        let user = register_user(&conn, &user_request("u@example.com")).unwrap();
        let greeting = greeting(&conn, &user.id, AccountKind::User).unwrap();
        assert_eq!(greeting.msg, "Hello, Asha Patil. Your email is u@example.com");
    }
}
