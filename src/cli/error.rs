//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::error::LoadError;
use crate::period::PeriodError;
use crate::source::SourceError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {0}. Run 'period-ingest init' to create one.")]
    ConfigNotFound(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Period(#[from] PeriodError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("{0}")]
    Load(#[from] LoadError),

    #[error("Validation failed for {0} table(s)")]
    ValidationFailed(usize),
}
