use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{enum_column, json_list, json_list_column};
use crate::db::DatabaseError;
use crate::models::*;

/// Fields needed to create a hospital account.
#[derive(Debug, Clone)]
pub struct NewHospital {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub website: Option<String>,
    pub address: Address,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub departments: Vec<String>,
    pub available_services: Vec<String>,
}

const HOSPITAL_COLUMNS: &str = "id, name, email, phone, website, street, city, state, postal_code,
     lat, long, departments, available_services, ratings, created_at, updated_at";

const DOCTOR_COLUMNS: &str = "id, name, department, phone, monday, tuesday, wednesday, thursday,
     friday, saturday, sunday";

fn hospital_from_row(row: &Row<'_>) -> rusqlite::Result<Hospital> {
    Ok(Hospital {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        website: row.get(4)?,
        address: Address {
            street: row.get(5)?,
            city: row.get(6)?,
            state: row.get(7)?,
            postal_code: row.get(8)?,
        },
        lat: row.get(9)?,
        long: row.get(10)?,
        departments: json_list_column(row, 11)?,
        available_services: json_list_column(row, 12)?,
        ratings: row.get(13)?,
        doctors: Vec::new(),
        appointments: Vec::new(),
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        department: row.get(2)?,
        phone: row.get(3)?,
        opd_schedule: OpdSchedule {
            monday: row.get(4)?,
            tuesday: row.get(5)?,
            wednesday: row.get(6)?,
            thursday: row.get(7)?,
            friday: row.get(8)?,
            saturday: row.get(9)?,
            sunday: row.get(10)?,
        },
    })
}

fn with_children(conn: &Connection, mut hospital: Hospital) -> Result<Hospital, DatabaseError> {
    hospital.doctors = list_doctors(conn, &hospital.id)?;
    hospital.appointments = list_hospital_appointments(conn, &hospital.id)?;
    Ok(hospital)
}

pub fn insert_hospital(conn: &Connection, hospital: &NewHospital) -> Result<Hospital, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO hospitals (id, name, email, password_hash, phone, website, street, city,
                                state, postal_code, lat, long, departments, available_services,
                                created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?15)",
        params![
            id,
            hospital.name,
            hospital.email,
            hospital.password_hash,
            hospital.phone,
            hospital.website,
            hospital.address.street,
            hospital.address.city,
            hospital.address.state,
            hospital.address.postal_code,
            hospital.lat,
            hospital.long,
            json_list(&hospital.departments)?,
            json_list(&hospital.available_services)?,
            now,
        ],
    )?;
    get_hospital(conn, &id)?.ok_or(DatabaseError::NotFound {
        entity_type: "hospital".into(),
        id,
    })
}

/// Load a hospital with its doctors and appointment summaries.
pub fn get_hospital(conn: &Connection, id: &str) -> Result<Option<Hospital>, DatabaseError> {
    let sql = format!("SELECT {HOSPITAL_COLUMNS} FROM hospitals WHERE id = ?1");
    match conn.query_row(&sql, params![id], hospital_from_row).optional()? {
        Some(hospital) => with_children(conn, hospital).map(Some),
        None => Ok(None),
    }
}

pub fn find_hospital_by_email(
    conn: &Connection,
    email: &str,
) -> Result<Option<Hospital>, DatabaseError> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM hospitals WHERE email = ?1", params![email], |row| row.get(0))
        .optional()?;
    match id {
        Some(id) => get_hospital(conn, &id),
        None => Ok(None),
    }
}

pub fn hospital_name(conn: &Connection, id: &str) -> Result<Option<String>, DatabaseError> {
    let name = conn
        .query_row("SELECT name FROM hospitals WHERE id = ?1", params![id], |row| row.get(0))
        .optional()?;
    Ok(name)
}

/// Hospitals with at least one department, one service and a city or
/// state. With a query, keeps those whose name, street, city or state
/// contain it (case-insensitive, literal).
pub fn search_hospitals(
    conn: &Connection,
    query: Option<&str>,
) -> Result<Vec<Hospital>, DatabaseError> {
    let sql = format!(
        "SELECT {HOSPITAL_COLUMNS} FROM hospitals
         WHERE json_array_length(departments) > 0
           AND json_array_length(available_services) > 0
           AND (trim(city) <> '' OR trim(state) <> '')
         ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], hospital_from_row)?;
    let complete: Vec<Hospital> = rows.collect::<Result<_, _>>()?;

    let needle = query
        .map(|q| q.trim().to_lowercase())
        .filter(|q| !q.is_empty());

    complete
        .into_iter()
        .filter(|h| needle.as_deref().map_or(true, |n| matches_query(h, n)))
        .map(|h| with_children(conn, h))
        .collect()
}

fn matches_query(hospital: &Hospital, needle: &str) -> bool {
    [
        &hospital.name,
        &hospital.address.street,
        &hospital.address.city,
        &hospital.address.state,
    ]
    .iter()
    .any(|field| field.to_lowercase().contains(needle))
}

/// Apply profile changes. Returns `None` when the hospital does not exist.
pub fn update_hospital(
    conn: &Connection,
    id: &str,
    changes: &ProfileChanges,
) -> Result<Option<Hospital>, DatabaseError> {
    let departments = changes.departments.as_deref().map(json_list).transpose()?;
    let services = changes.available_services.as_deref().map(json_list).transpose()?;
    let address = changes.address.as_ref();
    let changed = conn.execute(
        "UPDATE hospitals SET
            name = COALESCE(?2, name),
            phone = COALESCE(?3, phone),
            website = COALESCE(?4, website),
            street = COALESCE(?5, street),
            city = COALESCE(?6, city),
            state = COALESCE(?7, state),
            postal_code = COALESCE(?8, postal_code),
            departments = COALESCE(?9, departments),
            available_services = COALESCE(?10, available_services),
            ratings = COALESCE(?11, ratings),
            updated_at = ?12
         WHERE id = ?1",
        params![
            id,
            changes.name,
            changes.phone,
            changes.website,
            address.map(|a| a.street.as_str()),
            address.map(|a| a.city.as_str()),
            address.map(|a| a.state.as_str()),
            address.map(|a| a.postal_code.as_str()),
            departments,
            services,
            changes.ratings,
            Utc::now(),
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_hospital(conn, id)
}

pub fn set_hospital_coordinates(
    conn: &Connection,
    id: &str,
    lat: Option<f64>,
    long: Option<f64>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE hospitals SET lat = ?2, long = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, lat, long, Utc::now()],
    )?;
    Ok(())
}

/// Delete a hospital (doctors, appointments and summaries cascade).
/// Returns the hospital as it was before deletion.
pub fn delete_hospital(conn: &Connection, id: &str) -> Result<Option<Hospital>, DatabaseError> {
    let Some(hospital) = get_hospital(conn, id)? else {
        return Ok(None);
    };
    conn.execute("DELETE FROM hospitals WHERE id = ?1", params![id])?;
    Ok(Some(hospital))
}

// ─── Doctors ──────────────────────────────────────────────────────────────────

pub fn insert_doctor(
    conn: &Connection,
    hospital_id: &str,
    doctor: &Doctor,
) -> Result<(), DatabaseError> {
    let s = &doctor.opd_schedule;
    conn.execute(
        "INSERT INTO doctors (id, hospital_id, name, department, phone, monday, tuesday,
                              wednesday, thursday, friday, saturday, sunday, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            doctor.id,
            hospital_id,
            doctor.name,
            doctor.department,
            doctor.phone,
            s.monday,
            s.tuesday,
            s.wednesday,
            s.thursday,
            s.friday,
            s.saturday,
            s.sunday,
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn doctor_name_exists(
    conn: &Connection,
    hospital_id: &str,
    name: &str,
) -> Result<bool, DatabaseError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM doctors WHERE hospital_id = ?1 AND name = ?2",
            params![hospital_id, name],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(exists)
}

pub fn list_doctors(conn: &Connection, hospital_id: &str) -> Result<Vec<Doctor>, DatabaseError> {
    let sql = format!(
        "SELECT {DOCTOR_COLUMNS} FROM doctors WHERE hospital_id = ?1 ORDER BY created_at, rowid"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![hospital_id], doctor_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// A doctor that belongs to the given hospital.
pub fn get_doctor_in_hospital(
    conn: &Connection,
    hospital_id: &str,
    doctor_id: &str,
) -> Result<Option<Doctor>, DatabaseError> {
    let sql = format!("SELECT {DOCTOR_COLUMNS} FROM doctors WHERE hospital_id = ?1 AND id = ?2");
    let doctor = conn
        .query_row(&sql, params![hospital_id, doctor_id], doctor_from_row)
        .optional()?;
    Ok(doctor)
}

/// A doctor by id across all hospitals, with its hospital id.
pub fn find_doctor(
    conn: &Connection,
    doctor_id: &str,
) -> Result<Option<(Doctor, String)>, DatabaseError> {
    let sql = format!("SELECT {DOCTOR_COLUMNS}, hospital_id FROM doctors WHERE id = ?1");
    let found = conn
        .query_row(&sql, params![doctor_id], |row| {
            Ok((doctor_from_row(row)?, row.get::<_, String>(11)?))
        })
        .optional()?;
    Ok(found)
}

/// Every doctor with the name and id of its hospital.
pub fn list_all_doctors(conn: &Connection) -> Result<Vec<DoctorListing>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id, d.name, d.department, d.phone, d.monday, d.tuesday, d.wednesday,
                d.thursday, d.friday, d.saturday, d.sunday, h.id, h.name
         FROM doctors d JOIN hospitals h ON h.id = d.hospital_id
         ORDER BY h.name, d.name",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(DoctorListing {
            doctor: doctor_from_row(row)?,
            hospital_id: row.get(11)?,
            hospital_name: row.get(12)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

// ─── Appointment summaries ────────────────────────────────────────────────────

pub fn insert_hospital_appointment(
    conn: &Connection,
    hospital_id: &str,
    summary: &HospitalAppointment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO hospital_appointments (id, hospital_id, appointment_id, user_id, doctor_id,
                                            doctor_name, patient_name, patient_contact, date,
                                            time_slot, reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            summary.id,
            hospital_id,
            summary.appointment_id,
            summary.user_id,
            summary.doctor_id,
            summary.doctor_name,
            summary.patient_name,
            summary.patient_contact,
            summary.date,
            summary.time_slot,
            summary.reason,
            summary.status.as_str(),
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn list_hospital_appointments(
    conn: &Connection,
    hospital_id: &str,
) -> Result<Vec<HospitalAppointment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, user_id, doctor_id, doctor_name, patient_name,
                patient_contact, date, time_slot, reason, status
         FROM hospital_appointments WHERE hospital_id = ?1
         ORDER BY date DESC, created_at DESC",
    )?;
    let rows = stmt.query_map(params![hospital_id], |row| {
        Ok(HospitalAppointment {
            id: row.get(0)?,
            appointment_id: row.get(1)?,
            user_id: row.get(2)?,
            doctor_id: row.get(3)?,
            doctor_name: row.get(4)?,
            patient_name: row.get(5)?,
            patient_contact: row.get(6)?,
            date: row.get(7)?,
            time_slot: row.get(8)?,
            reason: row.get(9)?,
            status: enum_column(row, 10)?,
        })
    })?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    pub(crate) fn new_hospital(name: &str, email: &str, city: &str) -> NewHospital {
        NewHospital {
            name: name.into(),
            email: email.into(),
            password_hash: "hash".into(),
            phone: "02012345678".into(),
            website: None,
            address: Address {
                street: "1 Station Road".into(),
                city: city.into(),
                state: "Maharashtra".into(),
                postal_code: "411001".into(),
            },
            lat: None,
            long: None,
            departments: vec!["Cardiology".into()],
            available_services: vec!["OPD".into()],
        }
    }

    #[test]
    fn search_without_query_returns_only_complete_hospitals() {
        let conn = open_memory_database().unwrap();
        insert_hospital(&conn, &new_hospital("Complete", "a@h.in", "Pune")).unwrap();

        let mut no_departments = new_hospital("NoDept", "b@h.in", "Pune");
        no_departments.departments.clear();
        insert_hospital(&conn, &no_departments).unwrap();

        let mut no_services = new_hospital("NoServices", "c@h.in", "Pune");
        no_services.available_services.clear();
        insert_hospital(&conn, &no_services).unwrap();

        let mut no_location = new_hospital("Nowhere", "d@h.in", "");
        no_location.address.state = "  ".into();
        insert_hospital(&conn, &no_location).unwrap();

        let mut state_only = new_hospital("StateOnly", "e@h.in", "");
        state_only.address.state = "Goa".into();
        insert_hospital(&conn, &state_only).unwrap();

        let names: Vec<String> = search_hospitals(&conn, None)
            .unwrap()
            .into_iter()
            .map(|h| h.name)
            .collect();
        assert_eq!(names, vec!["Complete", "StateOnly"]);
    }

    #[test]
    fn search_matches_name_or_address_case_insensitively() {
        let conn = open_memory_database().unwrap();
        insert_hospital(&conn, &new_hospital("Ruby Hall Clinic", "r@h.in", "Pune")).unwrap();
        insert_hospital(&conn, &new_hospital("Lilavati", "l@h.in", "Mumbai")).unwrap();

        let by_name = search_hospitals(&conn, Some("ruby")).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name, "Ruby Hall Clinic");

        let by_city = search_hospitals(&conn, Some("  MUMBAI ")).unwrap();
        assert_eq!(by_city.len(), 1);
        assert_eq!(by_city[0].name, "Lilavati");

        let by_state = search_hospitals(&conn, Some("maharashtra")).unwrap();
        assert_eq!(by_state.len(), 2);
    }

    #[test]
    fn search_treats_query_literally() {
        let conn = open_memory_database().unwrap();
        insert_hospital(&conn, &new_hospital("St. Mary (Main)", "m@h.in", "Pune")).unwrap();
        insert_hospital(&conn, &new_hospital("Star Care", "s@h.in", "Pune")).unwrap();

        let hits = search_hospitals(&conn, Some("(main)")).unwrap();
        assert_eq!(hits.len(), 1);
        assert!(search_hospitals(&conn, Some("s.*")).unwrap().is_empty());
    }

    #[test]
    fn doctors_belong_to_their_hospital() {
        let conn = open_memory_database().unwrap();
        let a = insert_hospital(&conn, &new_hospital("A", "a@h.in", "Pune")).unwrap();
        let b = insert_hospital(&conn, &new_hospital("B", "b@h.in", "Pune")).unwrap();
        let doctor = Doctor {
            id: "doc-1".into(),
            name: "Dr. Rao".into(),
            department: "Cardiology".into(),
            phone: None,
            opd_schedule: OpdSchedule {
                monday: Some("10:00 AM - 12:00 PM".into()),
                ..Default::default()
            },
        };
        insert_doctor(&conn, &a.id, &doctor).unwrap();

        assert!(get_doctor_in_hospital(&conn, &a.id, "doc-1").unwrap().is_some());
        assert!(get_doctor_in_hospital(&conn, &b.id, "doc-1").unwrap().is_none());
        assert!(doctor_name_exists(&conn, &a.id, "Dr. Rao").unwrap());

        let (found, hospital_id) = find_doctor(&conn, "doc-1").unwrap().unwrap();
        assert_eq!(found, doctor);
        assert_eq!(hospital_id, a.id);

        let listing = list_all_doctors(&conn).unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].hospital_name, "A");
    }

    #[test]
    fn delete_cascades_to_doctors() {
        let conn = open_memory_database().unwrap();
        let h = insert_hospital(&conn, &new_hospital("Gone", "g@h.in", "Pune")).unwrap();
        insert_doctor(
            &conn,
            &h.id,
            &Doctor {
                id: "doc-x".into(),
                name: "Dr. X".into(),
                department: "ENT".into(),
                phone: None,
                opd_schedule: OpdSchedule::default(),
            },
        )
        .unwrap();

        let deleted = delete_hospital(&conn, &h.id).unwrap().unwrap();
        assert_eq!(deleted.doctors.len(), 1);
        assert!(get_hospital(&conn, &h.id).unwrap().is_none());
        assert!(find_doctor(&conn, "doc-x").unwrap().is_none());
        assert!(delete_hospital(&conn, &h.id).unwrap().is_none());
    }
}
