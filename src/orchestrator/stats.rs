//! Run statistics

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::bundle::BundleInfo;

/// Maximum number of error messages kept
const MAX_ERRORS: usize = 100;

/// Statistics from a load run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Periods that were loaded, published or both
    pub periods_processed: usize,
    /// Periods skipped because they were already loaded
    pub periods_skipped: usize,
    /// Periods whose previous load was unfinished and got purged
    pub periods_resumed: usize,
    /// Periods reloaded because overwrite was requested
    pub periods_reloaded: usize,
    /// Rows appended to destination tables
    pub rows_persisted: usize,
    /// Rows persisted per destination table
    pub table_rows: IndexMap<String, usize>,
    /// Tables excluded after a failed non-required validation
    pub tables_rejected: usize,
    /// Archives delivered to the publish destination
    pub bundles: Vec<BundleInfo>,
    /// Files copied into the period mirror
    pub files_mirrored: usize,
    /// Number of errors encountered
    pub errors_count: usize,
    /// List of errors (limited to first 100)
    pub errors: Vec<String>,
    /// Duration of the run
    #[serde(skip)]
    pub duration: Duration,
}

impl RunStats {
    /// Create new empty stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error (limited to 100)
    pub fn add_error(&mut self, error: String) {
        self.errors_count += 1;
        if self.errors.len() < MAX_ERRORS {
            self.errors.push(error);
        }
    }

    /// Record rows appended to `table`
    pub fn add_rows(&mut self, table: &str, rows: usize) {
        self.rows_persisted += rows;
        *self.table_rows.entry(table.to_string()).or_default() += rows;
    }

    /// Total size of delivered archives
    pub fn bytes_published(&self) -> u64 {
        self.bundles.iter().map(|b| b.size).sum()
    }

    /// Get rows per second throughput
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.rows_persisted as f64 / secs
        }
    }

    /// Format duration as human-readable string
    pub fn duration_string(&self) -> String {
        let secs = self.duration.as_secs();
        if secs < 60 {
            format!("{}s", secs)
        } else if secs < 3600 {
            format!("{}m {}s", secs / 60, secs % 60)
        } else {
            format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}
