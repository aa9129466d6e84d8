//! Load errors
//!
//! [`LoadError`] aggregates the per-module error types. Only the top-level
//! driver decides whether an error aborts the process.

use crate::bundle::{BundleError, FetchError};
use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::export::ExportError;
use crate::schema::SchemaError;
use crate::source::SourceError;
use crate::storage::StorageError;
use crate::validation::ValidationIssue;

/// Error type for a load run
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connection error: {0}")]
    Connection(String),

    /// A required table failed validation; carries every blocking diagnostic
    #[error("Validation of table '{table}' failed with {} error(s)", .diagnostics.len())]
    Validation {
        table: String,
        diagnostics: Vec<ValidationIssue>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Publish error: {0}")]
    Publish(String),
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        LoadError::Configuration(err.to_string())
    }
}

impl From<SchemaError> for LoadError {
    fn from(err: SchemaError) -> Self {
        LoadError::Configuration(err.to_string())
    }
}

impl From<FetchError> for LoadError {
    fn from(err: FetchError) -> Self {
        LoadError::Connection(err.to_string())
    }
}

impl From<BundleError> for LoadError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Storage(e) => LoadError::Storage(e),
            other => LoadError::Publish(other.to_string()),
        }
    }
}

impl From<ExportError> for LoadError {
    fn from(err: ExportError) -> Self {
        LoadError::Publish(err.to_string())
    }
}

/// Result type for load runs
pub type LoadResult<T> = Result<T, LoadError>;
