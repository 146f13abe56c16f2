//! Repository layer: entity-scoped database operations.
//!
//! Every function takes a borrowed `Connection` (or `Transaction`, which
//! derefs to one) so callers decide the transaction boundary.

mod account;
mod appointment;
mod hospital;
mod subscriber;
mod user;

use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;

use super::DatabaseError;

pub use account::*;
pub use appointment::*;
pub use hospital::*;
pub use subscriber::*;
pub use user::*;

/// Read a text column into a `str_enum!` type.
pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DatabaseError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Same as [`enum_column`] for nullable columns.
pub(crate) fn optional_enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = DatabaseError>,
{
    match row.get::<_, Option<String>>(idx)? {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(None),
    }
}

/// Read a JSON array column (departments, services, history, report paths).
pub(crate) fn json_list_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn json_list(values: &[String]) -> Result<String, DatabaseError> {
    serde_json::to_string(values).map_err(|e| DatabaseError::Corrupt {
        column: "json list",
        reason: e.to_string(),
    })
}
