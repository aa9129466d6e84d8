//! Control store and destination tables
//!
//! This module provides the transactional store behind the load controller:
//! - the control table, one record per load attempt of a period
//! - the destination data tables rows are appended to
//!
//! Two backends implement the same traits:
//! - DuckDB: embedded database for real runs (feature `duckdb-backend`)
//! - Memory: process-local store for tests and dry runs
//!
//! Every change made by a load step happens inside one transaction that
//! either commits completely or leaves the store untouched.

use chrono::NaiveDateTime;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

pub mod memory;
pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDbStore;

pub use memory::MemoryStore;
pub use schema::ControlSchema;

use crate::models::{ControlRecord, RowSet};
use crate::period::Period;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema creation failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Stored value could not be converted
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Control table missing
    #[error("Control table '{0}' not found. Run 'period-ingest init' first.")]
    NotInitialized(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Operations available inside one store transaction
pub trait ControlTransaction {
    /// Record with the greatest id for `period`
    fn latest_record(&mut self, period: Period) -> DatabaseResult<Option<ControlRecord>>;

    /// Insert an unfinished record and return it with its assigned id
    fn insert_record(
        &mut self,
        period: Period,
        started_at: NaiveDateTime,
    ) -> DatabaseResult<ControlRecord>;

    /// Set `finished_at` on record `id`
    fn finish_record(&mut self, id: i64, finished_at: NaiveDateTime) -> DatabaseResult<()>;

    /// Every record whose period lies in `start..=end`, ordered by id
    fn records_between(&mut self, start: Period, end: Period)
    -> DatabaseResult<Vec<ControlRecord>>;

    /// Delete the rows of `table` stamped with `period` in `period_column`.
    ///
    /// A table that does not exist yet holds no rows and yields zero.
    fn delete_period_rows(
        &mut self,
        table: &str,
        period_column: &str,
        period: Period,
    ) -> DatabaseResult<usize>;

    /// Append rows to `table`, creating it from the batch when absent
    fn append_rows(&mut self, table: &str, rows: &RowSet) -> DatabaseResult<usize>;
}

/// Transactional store holding the control table and destination tables
pub trait ControlStore {
    /// Create the control table if needed
    fn initialize(&self) -> DatabaseResult<()>;

    /// Whether the control table exists
    fn is_initialized(&self) -> DatabaseResult<bool>;

    /// Run `body` in one transaction; commit on `Ok`, roll back on `Err`
    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn ControlTransaction) -> DatabaseResult<()>,
    ) -> DatabaseResult<()>;

    /// Name of the backend, for log lines
    fn backend_type(&self) -> &'static str;
}

/// Run a value-returning closure in one transaction of `store`
pub fn transaction<T>(
    store: &dyn ControlStore,
    body: impl FnOnce(&mut dyn ControlTransaction) -> DatabaseResult<T>,
) -> DatabaseResult<T> {
    let mut body = Some(body);
    let mut output = None;
    store.with_transaction(&mut |tx| {
        let body = body.take().ok_or_else(|| {
            DatabaseError::TransactionFailed("transaction body ran twice".to_string())
        })?;
        output = Some(body(tx)?);
        Ok(())
    })?;
    output.ok_or_else(|| DatabaseError::TransactionFailed("transaction returned nothing".to_string()))
}
