use chrono::Utc;
use rusqlite::{params, Connection};

use crate::db::DatabaseError;

/// Add a newsletter subscriber. A repeated email is a unique violation.
pub fn insert_subscriber(conn: &Connection, email: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO subscribers (email, created_at) VALUES (?1, ?2)",
        params![email, Utc::now()],
    )?;
    Ok(())
}

pub fn count_subscribers(conn: &Connection) -> Result<i64, DatabaseError> {
    let count = conn.query_row("SELECT COUNT(*) FROM subscribers", [], |row| row.get(0))?;
    Ok(count)
}
