use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::{enum_column, json_list, json_list_column, optional_enum_column};
use crate::db::DatabaseError;
use crate::models::*;

/// Fields needed to create a user account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub phone: String,
    pub dob: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Address,
    pub medical_history: Vec<String>,
}

const USER_COLUMNS: &str = "id, name, email, phone, dob, gender, street, city, state, postal_code,
     medical_history, is_admin, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        dob: row.get(4)?,
        gender: optional_enum_column(row, 5)?,
        address: Address {
            street: row.get(6)?,
            city: row.get(7)?,
            state: row.get(8)?,
            postal_code: row.get(9)?,
        },
        medical_history: json_list_column(row, 10)?,
        is_admin: row.get(11)?,
        appointments: Vec::new(),
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

/// Insert a user. A duplicate email surfaces as a unique violation.
pub fn insert_user(conn: &Connection, user: &NewUser) -> Result<User, DatabaseError> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    conn.execute(
        "INSERT INTO users (id, name, email, password_hash, phone, dob, gender, street, city,
                            state, postal_code, medical_history, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
        params![
            id,
            user.name,
            user.email,
            user.password_hash,
            user.phone,
            user.dob,
            user.gender.map(|g| g.as_str()),
            user.address.street,
            user.address.city,
            user.address.state,
            user.address.postal_code,
            json_list(&user.medical_history)?,
            now,
        ],
    )?;
    get_user(conn, &id)?.ok_or(DatabaseError::NotFound {
        entity_type: "user".into(),
        id,
    })
}

/// Load a user with its appointment summaries (newest date first).
pub fn get_user(conn: &Connection, id: &str) -> Result<Option<User>, DatabaseError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
    let user = conn.query_row(&sql, params![id], user_from_row).optional()?;
    match user {
        Some(mut user) => {
            user.appointments = list_user_appointments(conn, &user.id)?;
            Ok(Some(user))
        }
        None => Ok(None),
    }
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>, DatabaseError> {
    let id: Option<String> = conn
        .query_row("SELECT id FROM users WHERE email = ?1", params![email], |row| row.get(0))
        .optional()?;
    match id {
        Some(id) => get_user(conn, &id),
        None => Ok(None),
    }
}

pub fn user_exists(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let exists = conn
        .query_row("SELECT 1 FROM users WHERE id = ?1", params![id], |_| Ok(()))
        .optional()?
        .is_some();
    Ok(exists)
}

/// Unknown ids are not admins.
pub fn user_is_admin(conn: &Connection, id: &str) -> Result<bool, DatabaseError> {
    let admin = conn
        .query_row(
            "SELECT is_admin FROM users WHERE id = ?1",
            params![id],
            |row| row.get::<_, bool>(0),
        )
        .optional()?
        .unwrap_or(false);
    Ok(admin)
}

/// Apply profile changes. Returns `None` when the user does not exist.
pub fn update_user_profile(
    conn: &Connection,
    id: &str,
    changes: &ProfileChanges,
) -> Result<Option<User>, DatabaseError> {
    let history = changes.medical_history.as_deref().map(json_list).transpose()?;
    let address = changes.address.as_ref();
    let changed = conn.execute(
        "UPDATE users SET
            name = COALESCE(?2, name),
            phone = COALESCE(?3, phone),
            dob = COALESCE(?4, dob),
            gender = COALESCE(?5, gender),
            street = COALESCE(?6, street),
            city = COALESCE(?7, city),
            state = COALESCE(?8, state),
            postal_code = COALESCE(?9, postal_code),
            medical_history = COALESCE(?10, medical_history),
            updated_at = ?11
         WHERE id = ?1",
        params![
            id,
            changes.name,
            changes.phone,
            changes.dob,
            changes.gender.map(|g| g.as_str()),
            address.map(|a| a.street.as_str()),
            address.map(|a| a.city.as_str()),
            address.map(|a| a.state.as_str()),
            address.map(|a| a.postal_code.as_str()),
            history,
            Utc::now(),
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_user(conn, id)
}

fn user_appointment_from_row(row: &Row<'_>) -> rusqlite::Result<UserAppointment> {
    Ok(UserAppointment {
        id: row.get(0)?,
        appointment_id: row.get(1)?,
        hospital_id: row.get(2)?,
        hospital_name: row.get(3)?,
        doctor_id: row.get(4)?,
        doctor_name: row.get(5)?,
        department: row.get(6)?,
        date: row.get(7)?,
        time_slot: row.get(8)?,
        reason: row.get(9)?,
        status: enum_column(row, 10)?,
    })
}

pub fn insert_user_appointment(
    conn: &Connection,
    user_id: &str,
    summary: &UserAppointment,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO user_appointments (id, user_id, appointment_id, hospital_id, hospital_name,
                                        doctor_id, doctor_name, department, date, time_slot,
                                        reason, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            summary.id,
            user_id,
            summary.appointment_id,
            summary.hospital_id,
            summary.hospital_name,
            summary.doctor_id,
            summary.doctor_name,
            summary.department,
            summary.date,
            summary.time_slot,
            summary.reason,
            summary.status.as_str(),
            Utc::now(),
        ],
    )?;
    Ok(())
}

pub fn list_user_appointments(
    conn: &Connection,
    user_id: &str,
) -> Result<Vec<UserAppointment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, hospital_id, hospital_name, doctor_id, doctor_name,
                department, date, time_slot, reason, status
         FROM user_appointments WHERE user_id = ?1
         ORDER BY date DESC, created_at DESC",
    )?;
    let rows = stmt.query_map(params![user_id], user_appointment_from_row)?;
    rows.map(|r| r.map_err(DatabaseError::from)).collect()
}
