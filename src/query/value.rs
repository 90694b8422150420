//! Literal values registered as graph parameters, and the declared value kinds
//! used for coercion during arithmetic.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Literal tagged with explicit type information so the parameter payload
/// handed to the external compiler remains unambiguous.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// Null literal.
    Null,
    /// Boolean literal.
    Bool(bool),
    /// Signed 64-bit integer literal.
    Int(i64),
    /// 64-bit floating point literal.
    Float(f64),
    /// UTF-8 string literal.
    String(String),
    /// Homogeneous list, used for id sets that are unwound into the graph.
    List(Vec<Value>),
    /// Caller-supplied in-memory table.
    Table(TableValue),
}

impl Value {
    /// Declared kind of a literal, when it has one.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Bool(_) => Some(ValueKind::Boolean),
            Value::Int(_) => Some(ValueKind::Integer),
            Value::Float(_) => Some(ValueKind::Float),
            Value::String(_) => Some(ValueKind::String),
            Value::Null | Value::List(_) | Value::Table(_) => None,
        }
    }
}

/// Declared value kind of an attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// True/false.
    Boolean,
    /// Whole numbers.
    Integer,
    /// Floating point numbers.
    Float,
    /// Any numeric value; the database decides integer vs float.
    Number,
    /// Text.
    String,
}

impl ValueKind {
    /// Lowercase name used in error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            ValueKind::Boolean => "boolean",
            ValueKind::Integer => "integer",
            ValueKind::Float => "float",
            ValueKind::Number => "number",
            ValueKind::String => "string",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column-oriented in-memory table bound to a table-variable handle.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableValue {
    /// Column names, in order.
    pub columns: Vec<String>,
    /// Row values, each the same length as `columns`.
    pub rows: Vec<Vec<Value>>,
}

impl TableValue {
    /// Creates an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends one row.
    pub fn with_row<I, V>(mut self, row: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.rows.push(row.into_iter().map(Into::into).collect());
        self
    }

    /// Whether `name` is one of the table's columns.
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::List(value.into_iter().map(Into::into).collect())
    }
}

impl From<TableValue> for Value {
    fn from(value: TableValue) -> Self {
        Value::Table(value)
    }
}
