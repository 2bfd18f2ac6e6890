/// Circle shared types
///
/// Records as the client sees them, the shapes sent to and received from the
/// hosted backend, realtime change events, and the table query builder.
/// Every backend implementation and the client core speak these types.

pub mod api;
pub mod events;
pub mod models;
pub mod query;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use query::{Filter, Op, Order, Query, Table};

/// A raw row as it crosses the backend boundary: a JSON object keyed by column.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Rejection produced when a raw row cannot become a typed record.
#[derive(Debug, Clone, thiserror::Error)]
#[error("malformed {table} row: {reason}")]
pub struct RowError {
    pub table: Table,
    pub reason: String,
}

/// A record stored in one backend table.
pub trait Record: DeserializeOwned {
    const TABLE: Table;
}

/// Parse and validate a raw row into a typed record.
pub fn parse_row<T: Record>(row: Row) -> Result<T, RowError> {
    serde_json::from_value(serde_json::Value::Object(row)).map_err(|e| RowError {
        table: T::TABLE,
        reason: e.to_string(),
    })
}

/// Serialize an insert/patch shape into a raw row.
/// Shapes that do not serialize to a JSON object yield an empty row.
pub fn to_row<T: Serialize>(value: &T) -> Row {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => Row::new(),
    }
}
