//! Per-run validation context
//!
//! Holds the batches already accepted during the current period so that
//! `ref` rules can be checked against them. A fresh context is created for
//! every period; nothing is shared between runs.

use std::collections::HashMap;

use crate::models::RowSet;

#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    tables: HashMap<String, RowSet>,
}

impl ValidationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an accepted batch, replacing any earlier one for the table
    pub fn insert(&mut self, table: impl Into<String>, rows: RowSet) {
        self.tables.insert(table.into(), rows);
    }

    pub fn get(&self, table: &str) -> Option<&RowSet> {
        self.tables.get(table)
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn remove(&mut self, table: &str) -> Option<RowSet> {
        self.tables.remove(table)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
