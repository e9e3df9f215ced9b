use std::sync::Arc;

use crate::error::{Result, SqlBindError};
use crate::types::SqlValue;

/// Driver-agnostic raw result from a database statement.
#[derive(Debug, Clone, Default)]
pub struct RawQueryResult {
    /// Column labels in order
    pub columns: Vec<String>,
    /// Rows, where each row is a vector of values in column order
    pub rows: Vec<Vec<SqlValue>>,
    /// Number of rows changed by an update
    pub rows_affected: u64,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }
}

/// A reference to a result column: 1-based index plus label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub index: usize,
    pub label: String,
}

impl ColumnRef {
    pub fn new(index: usize, label: impl Into<String>) -> Self {
        Self {
            index,
            label: label.into(),
        }
    }
}

/// A single row of a result.
/// Columns are addressed by 1-based index or by label.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Gets a value by 1-based column index.
    pub fn get(&self, index: usize) -> Result<&SqlValue> {
        index
            .checked_sub(1)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| SqlBindError::ResultProduction {
                index,
                label: self.label(index).unwrap_or("?").to_string(),
                message: format!("row has {} column(s)", self.values.len()),
            })
    }

    /// Resolves a label to its 1-based column index.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == label).map(|i| i + 1)
    }

    /// Label of the 1-based column index.
    pub fn label(&self, index: usize) -> Option<&str> {
        index
            .checked_sub(1)
            .and_then(|i| self.columns.get(i))
            .map(|s| s.as_str())
    }

    pub fn column(&self, index: usize) -> ColumnRef {
        ColumnRef::new(index, self.label(index).unwrap_or("?"))
    }

    /// Returns all column labels in this row.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> Row {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        Row::new(
            columns,
            vec![SqlValue::Int32(1), SqlValue::Text("John".to_string())],
        )
    }

    #[test]
    fn test_row_get() {
        let row = row();

        assert_eq!(row.get(1).unwrap(), &SqlValue::Int32(1));
        assert_eq!(row.get(2).unwrap(), &SqlValue::Text("John".to_string()));
        assert!(row.get(0).is_err());
        assert!(row.get(3).is_err());
    }

    #[test]
    fn test_row_labels() {
        let row = row();

        assert_eq!(row.index_of("name"), Some(2));
        assert_eq!(row.index_of("missing"), None);
        assert_eq!(row.column(1), ColumnRef::new(1, "id"));
    }
}
