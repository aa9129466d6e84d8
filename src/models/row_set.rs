//! Tabular batches
//!
//! A [`RowSet`] is the unit passed between sources, the validation engine,
//! the control store and the metadata exporter: an ordered list of column
//! names plus rows of typed cells.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::value::Value;

/// Errors raised by row-set reshaping
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RowSetError {
    #[error("Row {row} has {found} cells, expected {expected}")]
    WidthMismatch {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("Unknown column(s): {}", .0.join(", "))]
    UnknownColumns(Vec<String>),

    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),
}

/// Ordered columns and rows of typed cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl RowSet {
    /// Empty batch with the given columns
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a batch, checking that every row matches the column count
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, RowSetError> {
        let mut seen = HashSet::new();
        for column in &columns {
            if !seen.insert(column.as_str()) {
                return Err(RowSetError::DuplicateColumn(column.clone()));
            }
        }
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(RowSetError::WidthMismatch {
                row,
                expected: columns.len(),
                found: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Append one row; its width must match the columns
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), RowSetError> {
        if row.len() != self.columns.len() {
            return Err(RowSetError::WidthMismatch {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Distinct non-null lookup keys of a column
    pub fn distinct_keys(&self, name: &str) -> HashSet<String> {
        self.column_values(name)
            .map(|cells| cells.filter_map(Value::lookup_key).collect())
            .unwrap_or_default()
    }

    /// Project onto `columns` in the given order. Every name must exist.
    pub fn select(&self, columns: &[String]) -> Result<RowSet, RowSetError> {
        let missing: Vec<String> = columns
            .iter()
            .filter(|c| !self.has_column(c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(RowSetError::UnknownColumns(missing));
        }
        let indices: Vec<usize> = columns
            .iter()
            .filter_map(|c| self.column_index(c))
            .collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        RowSet::from_rows(columns.to_vec(), rows)
    }

    /// Rename columns through `mapping`; unmapped columns keep their name
    pub fn rename(&mut self, mapping: &IndexMap<String, String>) -> Result<(), RowSetError> {
        let renamed: Vec<String> = self
            .columns
            .iter()
            .map(|c| mapping.get(c).cloned().unwrap_or_else(|| c.clone()))
            .collect();
        let mut seen = HashSet::new();
        for column in &renamed {
            if !seen.insert(column.as_str()) {
                return Err(RowSetError::DuplicateColumn(column.clone()));
            }
        }
        self.columns = renamed;
        Ok(())
    }

    /// Set `column` to `value` on every row, appending the column if absent
    pub fn stamp(&mut self, column: &str, value: Value) {
        match self.column_index(column) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = value.clone();
                }
            }
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
    }

    /// Drop rows whose every cell is null. Returns the number removed.
    pub fn drop_blank_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| row.iter().any(|v| !v.is_null()));
        before - self.rows.len()
    }

    /// Append all rows of `other`, aligning by column name
    pub fn extend(&mut self, other: &RowSet) -> Result<(), RowSetError> {
        let aligned = other.select(&self.columns)?;
        self.rows.extend(aligned.rows);
        Ok(())
    }

    /// Rows as JSON objects keyed by column name, in column order
    pub fn to_json_records(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.clone(), v.to_json()))
                    .collect()
            })
            .collect()
    }
}
