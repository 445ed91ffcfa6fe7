//! Rows and query results.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::{FromValue, SqlValue};

/// Column metadata describing a result set column.
///
/// This struct is marked `#[non_exhaustive]` to allow adding new fields
/// in future versions without breaking semver compatibility. Use
/// [`Column::new()`] to construct instances.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column index (0-based).
    pub index: usize,
    /// PostgreSQL type name (e.g., "int4", "text").
    pub type_name: String,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, index: usize, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index,
            type_name: type_name.into(),
        }
    }
}

/// A row from a query result.
///
/// Rows of one result share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Create a row from shared column metadata and its values.
    pub fn new(columns: Arc<[Column]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Number of columns in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no columns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Raw values, in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Consume the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }

    /// Get the raw value at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get the raw value of the first column named `name`.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.column_index(name).and_then(|idx| self.values.get(idx))
    }

    /// Index of the first column named `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    /// Get the value at `index`, converted to `T`.
    pub fn try_get<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::Type(format!(
                "column index {index} out of range for row with {} columns",
                self.values.len()
            ))
        })?;
        T::from_value(value)
    }

    /// Get the value of the column named `name`, converted to `T`.
    pub fn try_get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| Error::Type(format!("no column named {name:?}")))?;
        self.try_get(idx)
    }
}

/// The result of executing a query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
    rows_affected: u64,
}

impl QueryResult {
    /// Create a query result.
    pub fn new(columns: Arc<[Column]>, rows: Vec<Row>, rows_affected: u64) -> Self {
        Self {
            columns,
            rows,
            rows_affected,
        }
    }

    /// A result with no columns and no rows.
    #[must_use]
    pub fn empty(rows_affected: u64) -> Self {
        Self::new(Arc::from(Vec::new()), Vec::new(), rows_affected)
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Returned rows, in server order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows returned or affected, as reported by the server.
    #[must_use]
    pub fn rows_affected(&self) -> u64 {
        self.rows_affected
    }

    /// Number of rows returned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The first row, if any.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// The first column of the first row, converted to `T`.
    pub fn scalar<T: FromValue>(&self) -> Result<T> {
        self.rows
            .first()
            .ok_or_else(|| Error::Type("query returned no rows".into()))?
            .try_get(0)
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    /// Consume the result, returning its rows.
    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a QueryResult {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl IntoIterator for QueryResult {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
