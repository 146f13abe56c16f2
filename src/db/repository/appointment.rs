use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{enum_column, json_list, json_list_column};
use crate::db::DatabaseError;
use crate::models::*;

const APPOINTMENT_COLUMNS: &str = "id, hospital_id, doctor_id, user_id, department, reason, date,
     time_slot, status, patient_name, patient_email, patient_age, patient_gender, patient_contact,
     patient_street, patient_city, patient_state, patient_postal_code, report_paths, created_at,
     updated_at";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    Ok(Appointment {
        id: row.get(0)?,
        hospital: row.get(1)?,
        doctor: row.get(2)?,
        user_id: row.get(3)?,
        department: row.get(4)?,
        reason: row.get(5)?,
        date: row.get(6)?,
        time_slot: row.get(7)?,
        status: enum_column(row, 8)?,
        patient: PatientSnapshot {
            name: row.get(9)?,
            email: row.get(10)?,
            age: row.get(11)?,
            gender: row.get(12)?,
            contact: row.get(13)?,
            address: row.get(14)?,
            city: row.get(15)?,
            state: row.get(16)?,
            pincode: row.get(17)?,
        },
        reports: json_list_column(row, 18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

/// Insert an appointment. Taking an active slot that is already held
/// fails with a unique violation on `idx_appointments_active_slot`.
pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> Result<(), DatabaseError> {
    let p = &appt.patient;
    conn.execute(
        "INSERT INTO appointments (id, hospital_id, doctor_id, user_id, department, reason, date,
                                   time_slot, status, patient_name, patient_email, patient_age,
                                   patient_gender, patient_contact, patient_street, patient_city,
                                   patient_state, patient_postal_code, report_paths, created_at,
                                   updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                 ?18, ?19, ?20, ?21)",
        params![
            appt.id,
            appt.hospital,
            appt.doctor,
            appt.user_id,
            appt.department,
            appt.reason,
            appt.date,
            appt.time_slot,
            appt.status.as_str(),
            p.name,
            p.email,
            p.age,
            p.gender,
            p.contact,
            p.address,
            p.city,
            p.state,
            p.pincode,
            json_list(&appt.reports)?,
            appt.created_at,
            appt.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> Result<Option<Appointment>, DatabaseError> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    let appt = conn.query_row(&sql, params![id], appointment_from_row).optional()?;
    Ok(appt)
}

/// Whether an active appointment (other than `exclude_id`) holds the slot.
pub fn active_slot_taken(
    conn: &Connection,
    doctor_id: &str,
    date: NaiveDate,
    time_slot: &str,
    exclude_id: Option<&str>,
) -> Result<bool, DatabaseError> {
    let taken = conn
        .query_row(
            "SELECT 1 FROM appointments
             WHERE doctor_id = ?1 AND date = ?2 AND time_slot = ?3
               AND status IN ('pending', 'confirmed')
               AND (?4 IS NULL OR id <> ?4)
             LIMIT 1",
            params![doctor_id, date, time_slot, exclude_id],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(taken)
}

/// Appointments booked at a hospital, newest date first.
pub fn list_appointments_for_hospital(
    conn: &Connection,
    hospital_id: &str,
) -> Result<Vec<Appointment>, DatabaseError> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE hospital_id = ?1
         ORDER BY date DESC, created_at DESC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![hospital_id], appointment_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}

/// Rewrite the mutable fields of an appointment and mirror them into
/// both summary tables.
pub fn update_appointment_fields(
    conn: &Connection,
    id: &str,
    date: NaiveDate,
    reason: &str,
    status: AppointmentStatus,
) -> Result<(), DatabaseError> {
    let now = Utc::now();
    let changed = conn.execute(
        "UPDATE appointments SET date = ?2, reason = ?3, status = ?4, updated_at = ?5
         WHERE id = ?1",
        params![id, date, reason, status.as_str(), now],
    )?;
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "appointment".into(),
            id: id.into(),
        });
    }
    for table in ["hospital_appointments", "user_appointments"] {
        conn.execute(
            &format!(
                "UPDATE {table} SET date = ?2, reason = ?3, status = ?4 WHERE appointment_id = ?1"
            ),
            params![id, date, reason, status.as_str()],
        )?;
    }
    Ok(())
}
