use anyhow::{Result, anyhow, bail};
use chrono::{SecondsFormat, Utc};
use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use uuid::Uuid;

use circle_types::{Op, Query, Row, Table};

use crate::Database;

/// A stored row together with its insertion sequence.
struct StoredRow {
    seq: i64,
    body: Row,
}

impl Database {
    // -- Rows --

    pub fn select_rows(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            Ok(query_rows(conn, table, query)?
                .into_iter()
                .map(|r| r.body)
                .collect())
        })
    }

    /// Insert a row, assigning `id` and `created_at` when the caller left them out.
    pub fn insert_row(&self, table: Table, mut row: Row) -> Result<Row> {
        if row.get("id").is_none_or(Value::is_null) {
            row.insert("id".into(), Value::String(Uuid::new_v4().to_string()));
        }
        if row.get("created_at").is_none_or(Value::is_null) {
            row.insert("created_at".into(), Value::String(timestamp()));
        }
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("{} row id must be a string", table))?
            .to_string();

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO rows (tbl, id, body) VALUES (?1, ?2, ?3)",
                rusqlite::params![table.as_str(), id, serde_json::to_string(&row)?],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    /// Merge `patch` into every matching row. Returns (before, after) pairs.
    pub fn update_rows(&self, table: Table, query: &Query, patch: &Row) -> Result<Vec<(Row, Row)>> {
        if patch.contains_key("id") {
            bail!("row ids are immutable");
        }

        self.with_conn(|conn| {
            let matched = query_rows(conn, table, query)?;
            let mut changed = Vec::with_capacity(matched.len());
            for stored in matched {
                let mut next = stored.body.clone();
                for (key, value) in patch {
                    next.insert(key.clone(), value.clone());
                }
                conn.execute(
                    "UPDATE rows SET body = ?1 WHERE seq = ?2",
                    rusqlite::params![serde_json::to_string(&next)?, stored.seq],
                )?;
                changed.push((stored.body, next));
            }
            Ok(changed)
        })
    }

    pub fn delete_rows(&self, table: Table, query: &Query) -> Result<Vec<Row>> {
        self.with_conn(|conn| {
            let matched = query_rows(conn, table, query)?;
            for stored in &matched {
                conn.execute("DELETE FROM rows WHERE seq = ?1", [stored.seq])?;
            }
            Ok(matched.into_iter().map(|r| r.body).collect())
        })
    }

    // -- Objects --

    pub fn put_object(&self, bucket: &str, path: &str, content_type: &str, data: &[u8]) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO objects (bucket, path, content_type, data) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![bucket, path, content_type, data],
            )?;
            Ok(())
        })
    }

    pub fn get_object(&self, bucket: &str, path: &str) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT data FROM objects WHERE bucket = ?1 AND path = ?2",
                [bucket, path],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

/// Timestamps are written with fixed precision so text order equals time order.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_path(column: &str) -> Result<SqlValue> {
    let valid = !column.is_empty()
        && column
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        bail!("invalid column name '{}'", column);
    }
    Ok(SqlValue::Text(format!("$.{}", column)))
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Build `SELECT seq, body ...` for a table query. Column names travel as
/// bound JSON paths, never spliced into the SQL text.
fn build_select(table: Table, query: &Query) -> Result<(String, Vec<SqlValue>)> {
    let mut sql = String::from("SELECT seq, body FROM rows WHERE tbl = ?");
    let mut params = vec![SqlValue::Text(table.as_str().to_string())];

    for filter in &query.filters {
        let path = json_path(&filter.column)?;
        let clause = match filter.op {
            Op::IsNull => {
                params.push(path);
                "json_extract(body, ?) IS NULL".to_string()
            }
            Op::Eq if filter.value.is_null() => {
                params.push(path);
                "json_extract(body, ?) IS NULL".to_string()
            }
            Op::In => {
                let values = filter
                    .value
                    .as_array()
                    .ok_or_else(|| anyhow!("IN filter on '{}' needs an array", filter.column))?;
                if values.is_empty() {
                    "0".to_string()
                } else {
                    params.push(path);
                    params.extend(values.iter().map(to_sql));
                    let marks = vec!["?"; values.len()].join(", ");
                    format!("json_extract(body, ?) IN ({})", marks)
                }
            }
            op => {
                let sym = match op {
                    Op::Eq => "=",
                    Op::Neq => "!=",
                    Op::Gt => ">",
                    Op::Gte => ">=",
                    Op::Lt => "<",
                    _ => "<=",
                };
                params.push(path);
                params.push(to_sql(&filter.value));
                format!("json_extract(body, ?) {} ?", sym)
            }
        };
        sql.push_str(" AND ");
        sql.push_str(&clause);
    }

    match &query.order {
        Some(order) => {
            params.push(json_path(&order.column)?);
            let dir = if order.ascending { "ASC" } else { "DESC" };
            sql.push_str(&format!(" ORDER BY json_extract(body, ?) {}, seq {}", dir, dir));
        }
        None => sql.push_str(" ORDER BY seq ASC"),
    }

    if let Some(limit) = query.limit {
        sql.push_str(" LIMIT ?");
        params.push(SqlValue::Integer(i64::from(limit)));
    }

    Ok((sql, params))
}

fn query_rows(conn: &Connection, table: Table, query: &Query) -> Result<Vec<StoredRow>> {
    let (sql, params) = build_select(table, query)?;
    let mut stmt = conn.prepare(&sql)?;

    let raw = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    raw.into_iter()
        .map(|(seq, text)| {
            let body: Row = serde_json::from_str(&text)?;
            Ok(StoredRow { seq, body })
        })
        .collect()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
