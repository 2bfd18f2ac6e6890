use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tables exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Users,
    Groups,
    Prompts,
    Submissions,
    Messages,
    Reactions,
    Reports,
    Notifications,
    Queue,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::Users,
        Table::Groups,
        Table::Prompts,
        Table::Submissions,
        Table::Messages,
        Table::Reactions,
        Table::Reports,
        Table::Notifications,
        Table::Queue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Groups => "groups",
            Self::Prompts => "prompts",
            Self::Submissions => "submissions",
            Self::Messages => "messages",
            Self::Reactions => "reactions",
            Self::Reports => "reports",
            Self::Notifications => "notifications",
            Self::Queue => "queue",
        }
    }

    pub fn parse(name: &str) -> Option<Table> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison operators supported by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    IsNull,
}

impl Op {
    /// Operator keyword in the REST filter syntax (`col=eq.value`).
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Neq => "neq",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::IsNull => "is",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub column: String,
    pub op: Op,
    /// For `Op::In` this is a JSON array. Ignored for `Op::IsNull`.
    pub value: Value,
}

impl Filter {
    pub fn new(column: &str, op: Op, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, Op::Eq, value)
    }

    /// Check a raw row against this filter. Used by realtime fan-out, where
    /// events are matched in memory instead of by the store.
    pub fn matches(&self, row: &crate::Row) -> bool {
        let field = row.get(&self.column).unwrap_or(&Value::Null);
        match self.op {
            Op::Eq => loosely_equal(field, &self.value),
            Op::Neq => !loosely_equal(field, &self.value),
            Op::IsNull => field.is_null(),
            Op::In => self
                .value
                .as_array()
                .is_some_and(|vals| vals.iter().any(|v| loosely_equal(field, v))),
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => match compare(field, &self.value) {
                Some(ord) => match self.op {
                    Op::Gt => ord.is_gt(),
                    Op::Gte => ord.is_ge(),
                    Op::Lt => ord.is_lt(),
                    _ => ord.is_le(),
                },
                None => false,
            },
        }
    }

    /// Render the value part of a REST filter (`eq.abc`, `in.(a,b)`, `is.null`).
    pub fn rest_value(&self) -> String {
        match self.op {
            Op::IsNull => "is.null".to_string(),
            Op::In => {
                let items: Vec<String> = self
                    .value
                    .as_array()
                    .map(|vals| vals.iter().map(scalar_text).collect())
                    .unwrap_or_default();
                format!("in.({})", items.join(","))
            }
            op => format!("{}.{}", op.keyword(), scalar_text(&self.value)),
        }
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Filtered, ordered, limited table read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<u32>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::eq(column, value));
        self
    }

    pub fn filter(mut self, column: &str, op: Op, value: impl Into<Value>) -> Self {
        self.filters.push(Filter::new(column, op, value));
        self
    }

    pub fn is_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.filters.push(Filter::new(column, Op::In, Value::Array(values)));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> crate::Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn filters_match_rows_in_memory() {
        let r = row(json!({ "group_id": "g1", "streak_count": 3, "current_prompt_id": null }));

        assert!(Filter::eq("group_id", "g1").matches(&r));
        assert!(!Filter::eq("group_id", "g2").matches(&r));
        assert!(Filter::new("streak_count", Op::Gte, 3).matches(&r));
        assert!(!Filter::new("streak_count", Op::Gt, 3).matches(&r));
        assert!(Filter::new("current_prompt_id", Op::IsNull, Value::Null).matches(&r));
        assert!(Filter::new("group_id", Op::In, json!(["g0", "g1"])).matches(&r));
    }

    #[test]
    fn rest_values_render() {
        assert_eq!(Filter::eq("user_id", "abc").rest_value(), "eq.abc");
        assert_eq!(Filter::new("n", Op::Lt, 5).rest_value(), "lt.5");
        assert_eq!(
            Filter::new("id", Op::In, json!(["a", "b"])).rest_value(),
            "in.(a,b)"
        );
        assert_eq!(Filter::new("x", Op::IsNull, Value::Null).rest_value(), "is.null");
    }

    #[test]
    fn table_names_roundtrip_through_parse() {
        for table in Table::ALL {
            assert_eq!(Table::parse(table.as_str()), Some(table));
        }
        assert_eq!(Table::parse("channels"), None);
    }
}
