use std::fmt;

use chrono::{DateTime, Utc};

/// SQL type tags, used for array element types and OUT parameter registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SqlType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Timestamp,
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::Bool => "boolean",
            SqlType::Int2 => "smallint",
            SqlType::Int4 => "integer",
            SqlType::Int8 => "bigint",
            SqlType::Float4 => "real",
            SqlType::Float8 => "double precision",
            SqlType::Text => "text",
            SqlType::Timestamp => "timestamptz",
        };
        f.write_str(name)
    }
}

/// Represents a SQL parameter or column value in a driver-agnostic way.
/// Drivers are responsible for converting these to their native types.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Array {
        element_type: SqlType,
        values: Vec<SqlValue>,
    },
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The SQL type of this value, or `None` for NULL.
    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            SqlValue::Null | SqlValue::Array { .. } => None,
            SqlValue::Bool(_) => Some(SqlType::Bool),
            SqlValue::Int16(_) => Some(SqlType::Int2),
            SqlValue::Int32(_) => Some(SqlType::Int4),
            SqlValue::Int64(_) => Some(SqlType::Int8),
            SqlValue::Float32(_) => Some(SqlType::Float4),
            SqlValue::Float64(_) => Some(SqlType::Float8),
            SqlValue::Text(_) => Some(SqlType::Text),
            SqlValue::Timestamp(_) => Some(SqlType::Timestamp),
        }
    }

    /// Short description used in conversion error messages.
    pub fn describe(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Array { element_type, .. } => format!("{}[]", element_type),
            other => other
                .sql_type()
                .map(|t| t.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i16> for SqlValue {
    fn from(value: i16) -> Self {
        SqlValue::Int16(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int32(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int64(value)
    }
}

impl From<f32> for SqlValue {
    fn from(value: f32) -> Self {
        SqlValue::Float32(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float64(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}
