use serde::{Deserialize, Serialize};

use crate::{Record, Row, RowError, Table, parse_row};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// A row-level change pushed by the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub table: Table,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    /// New row contents. Empty for deletes.
    #[serde(default)]
    pub record: Row,
    /// Previous contents. Hosted providers often send only the key.
    #[serde(default)]
    pub old_record: Row,
}

impl ChangeEvent {
    pub fn insert(table: Table, record: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Insert,
            record,
            old_record: Row::new(),
        }
    }

    pub fn update(table: Table, record: Row, old_record: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Update,
            record,
            old_record,
        }
    }

    pub fn delete(table: Table, old_record: Row) -> Self {
        Self {
            table,
            kind: ChangeKind::Delete,
            record: Row::new(),
            old_record,
        }
    }

    /// The row that identifies this change: the new record, or the old one for deletes.
    pub fn subject(&self) -> &Row {
        match self.kind {
            ChangeKind::Delete => &self.old_record,
            _ => &self.record,
        }
    }

    /// Parse the new record as a typed value.
    pub fn parse<T: Record>(&self) -> Result<T, RowError> {
        parse_row(self.record.clone())
    }

    /// Id of the affected row, read from the subject row.
    pub fn row_id(&self) -> Option<uuid::Uuid> {
        self.subject()
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}
