//! Typed reads and writes on top of the raw `Backend` rows.
//!
//! Rows are parsed at this boundary. List reads skip rows that fail to parse
//! (with a warning) so one corrupt row cannot blank a whole screen; single
//! reads and writes surface `BackendError::Malformed`.

use serde::Serialize;
use tracing::warn;

use circle_types::{Query, Record, Table, parse_row, to_row};

use crate::{Backend, Result};

pub async fn fetch<T: Record>(backend: &dyn Backend, query: &Query) -> Result<Vec<T>> {
    let rows = backend.select(T::TABLE, query).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        match parse_row::<T>(row) {
            Ok(record) => out.push(record),
            Err(e) => warn!("Skipping corrupt row: {}", e),
        }
    }
    Ok(out)
}

pub async fn fetch_one<T: Record>(backend: &dyn Backend, query: &Query) -> Result<Option<T>> {
    let query = query.clone().limit(1);
    let mut rows = backend.select(T::TABLE, &query).await?;
    match rows.pop() {
        Some(row) => Ok(Some(parse_row(row)?)),
        None => Ok(None),
    }
}

pub async fn fetch_by_id<T: Record>(backend: &dyn Backend, id: uuid::Uuid) -> Result<Option<T>> {
    fetch_one(backend, &Query::new().eq("id", id.to_string())).await
}

pub async fn create<T: Record, S: Serialize>(backend: &dyn Backend, shape: &S) -> Result<T> {
    let row = backend.insert(T::TABLE, to_row(shape)).await?;
    Ok(parse_row(row)?)
}

pub async fn patch<T: Record, S: Serialize>(
    backend: &dyn Backend,
    query: &Query,
    shape: &S,
) -> Result<Vec<T>> {
    let rows = backend.update(T::TABLE, query, to_row(shape)).await?;
    rows.into_iter()
        .map(|row| parse_row(row).map_err(Into::into))
        .collect()
}

/// Delete matching rows, returning how many went away.
pub async fn remove(backend: &dyn Backend, table: Table, query: &Query) -> Result<usize> {
    Ok(backend.delete(table, query).await?.len())
}
