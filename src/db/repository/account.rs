use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::DatabaseError;
use crate::models::{AccountKind, Credentials};

fn table(kind: AccountKind) -> &'static str {
    match kind {
        AccountKind::User => "users",
        AccountKind::Hospital => "hospitals",
    }
}

fn credentials_from_row(kind: AccountKind, row: &Row<'_>) -> rusqlite::Result<Credentials> {
    Ok(Credentials {
        kind,
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        otp_hash: row.get(4)?,
        otp_expires_at: row.get(5)?,
        reset_allowed_until: row.get(6)?,
    })
}

pub fn get_credentials_by_email(
    conn: &Connection,
    kind: AccountKind,
    email: &str,
) -> Result<Option<Credentials>, DatabaseError> {
    let sql = format!(
        "SELECT id, name, email, password_hash, otp_hash, otp_expires_at, reset_allowed_until
         FROM {} WHERE email = ?1",
        table(kind)
    );
    let creds = conn
        .query_row(&sql, params![email], |row| credentials_from_row(kind, row))
        .optional()?;
    Ok(creds)
}

pub fn get_credentials_by_id(
    conn: &Connection,
    kind: AccountKind,
    id: &str,
) -> Result<Option<Credentials>, DatabaseError> {
    let sql = format!(
        "SELECT id, name, email, password_hash, otp_hash, otp_expires_at, reset_allowed_until
         FROM {} WHERE id = ?1",
        table(kind)
    );
    let creds = conn
        .query_row(&sql, params![id], |row| credentials_from_row(kind, row))
        .optional()?;
    Ok(creds)
}

/// Replace any pending OTP for the account.
pub fn store_otp(
    conn: &Connection,
    kind: AccountKind,
    id: &str,
    otp_hash: &[u8],
    expires_at: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET otp_hash = ?2, otp_expires_at = ?3, updated_at = ?4 WHERE id = ?1",
        table(kind)
    );
    let changed = conn.execute(&sql, params![id, otp_hash, expires_at, Utc::now()])?;
    expect_one(changed, kind, id)
}

/// Consume the OTP and allow a password reset until `until`.
pub fn open_reset_window(
    conn: &Connection,
    kind: AccountKind,
    id: &str,
    until: DateTime<Utc>,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET otp_hash = NULL, otp_expires_at = NULL, reset_allowed_until = ?2,
                updated_at = ?3
         WHERE id = ?1",
        table(kind)
    );
    let changed = conn.execute(&sql, params![id, until, Utc::now()])?;
    expect_one(changed, kind, id)
}

/// Store a new password hash and close the reset window.
pub fn set_password_hash(
    conn: &Connection,
    kind: AccountKind,
    id: &str,
    password_hash: &str,
) -> Result<(), DatabaseError> {
    let sql = format!(
        "UPDATE {} SET password_hash = ?2, reset_allowed_until = NULL, otp_hash = NULL,
                otp_expires_at = NULL, updated_at = ?3
         WHERE id = ?1",
        table(kind)
    );
    let changed = conn.execute(&sql, params![id, password_hash, Utc::now()])?;
    expect_one(changed, kind, id)
}

fn expect_one(changed: usize, kind: AccountKind, id: &str) -> Result<(), DatabaseError> {
    if changed == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: kind.as_str().into(),
            id: id.into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::{insert_user, NewUser};
    use crate::db::sqlite::open_memory_database;
    use crate::models::Address;

    fn seed_user(conn: &Connection) -> String {
        insert_user(
            conn,
            &NewUser {
                name: "Asha".into(),
                email: "asha@example.com".into(),
                password_hash: "hash".into(),
                phone: "9876543210".into(),
                dob: None,
                gender: None,
                address: Address::default(),
                medical_history: vec![],
            },
        )
        .unwrap()
        .id
    }

    #[test]
    fn credentials_lookup_is_scoped_by_kind() {
        let conn = open_memory_database().unwrap();
        seed_user(&conn);
        assert!(get_credentials_by_email(&conn, AccountKind::User, "asha@example.com")
            .unwrap()
            .is_some());
        assert!(get_credentials_by_email(&conn, AccountKind::Hospital, "asha@example.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn otp_then_reset_window_then_password() {
        let conn = open_memory_database().unwrap();
        let id = seed_user(&conn);
        let expires = Utc::now() + chrono::Duration::minutes(10);

        store_otp(&conn, AccountKind::User, &id, &[1, 2, 3], expires).unwrap();
        let creds = get_credentials_by_id(&conn, AccountKind::User, &id).unwrap().unwrap();
        assert_eq!(creds.otp_hash.as_deref(), Some(&[1u8, 2, 3][..]));
        assert!(creds.otp_expires_at.is_some());

        open_reset_window(&conn, AccountKind::User, &id, expires).unwrap();
        let creds = get_credentials_by_id(&conn, AccountKind::User, &id).unwrap().unwrap();
        assert!(creds.otp_hash.is_none());
        assert!(creds.reset_allowed_until.is_some());

        set_password_hash(&conn, AccountKind::User, &id, "new-hash").unwrap();
        let creds = get_credentials_by_id(&conn, AccountKind::User, &id).unwrap().unwrap();
        assert_eq!(creds.password_hash, "new-hash");
        assert!(creds.reset_allowed_until.is_none());
    }

    #[test]
    fn updates_on_missing_account_report_not_found() {
        let conn = open_memory_database().unwrap();
        let err = store_otp(&conn, AccountKind::Hospital, "nope", &[0], Utc::now()).unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }
}
