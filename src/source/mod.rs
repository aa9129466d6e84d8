//! Row sources
//!
//! A source produces the raw rows of one configured table for one period:
//! - `sql`: a query against a DuckDB database, bound to the period date
//! - `csv`: a delimited file on a storage backend, path derived from the period
//!
//! [`ConfiguredSource`] routes each table to the source named in its
//! configuration.

pub mod csv;
#[cfg(feature = "duckdb-backend")]
pub mod sql;

pub use self::csv::CsvSource;
#[cfg(feature = "duckdb-backend")]
pub use self::sql::SqlSource;

use indexmap::IndexMap;
use std::path::Path;
use tracing::debug;

use crate::config::{LoaderConfig, SourceConfig, TableConfig};
use crate::models::{RowSet, RowSetError};
use crate::period::Period;
use crate::storage::StorageError;
use crate::storage::filesystem::FileSystemStorageBackend;

/// Error type for row sources
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Table '{table}' uses unknown source '{source_name}'")]
    UnknownSource { table: String, source_name: String },

    #[error("Source file {0} not found")]
    MissingFile(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to read {path}: {message}")]
    Csv { path: String, message: String },

    #[error("Query for table '{table}' failed: {message}")]
    Database { table: String, message: String },

    #[error("Table '{table}' cannot be read from this source: {message}")]
    InvalidTable { table: String, message: String },

    #[error("Malformed rows for table '{table}': {source}")]
    Rows {
        table: String,
        #[source]
        source: RowSetError,
    },
}

/// Produces the rows of one table for one period
pub trait RowSource {
    fn fetch(&self, table: &TableConfig, period: Period) -> Result<RowSet, SourceError>;
}

/// Sources from the `[sources]` section, keyed by name
#[derive(Default)]
pub struct ConfiguredSource {
    sources: IndexMap<String, Box<dyn RowSource>>,
}

impl ConfiguredSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under `name`
    pub fn with_source(mut self, name: impl Into<String>, source: Box<dyn RowSource>) -> Self {
        self.sources.insert(name.into(), source);
        self
    }

    /// Open every source declared in `config`
    pub fn from_config(config: &LoaderConfig) -> Result<Self, SourceError> {
        Self::open_all(config, |_| None)
    }

    /// Open every source declared in `config`, reusing the control store's
    /// database for a source that points at the same file
    #[cfg(feature = "duckdb-backend")]
    pub fn from_config_sharing(
        config: &LoaderConfig,
        control: &crate::database::DuckDbStore,
    ) -> Result<Self, SourceError> {
        Self::open_all(config, |path| {
            if control.db_path() != Some(path) {
                return None;
            }
            Some(
                control
                    .clone_connection()
                    .map(|conn| Box::new(SqlSource::from_connection(conn)) as Box<dyn RowSource>)
                    .map_err(|e| SourceError::Database {
                        table: path.display().to_string(),
                        message: e.to_string(),
                    }),
            )
        })
    }

    fn open_all(
        config: &LoaderConfig,
        shared: impl Fn(&Path) -> Option<Result<Box<dyn RowSource>, SourceError>>,
    ) -> Result<Self, SourceError> {
        let mut configured = Self::new();
        for (name, source) in &config.sources {
            let opened: Box<dyn RowSource> = match source {
                SourceConfig::Files { root } => Box::new(CsvSource::new(Box::new(
                    FileSystemStorageBackend::new(config.resolve_path(root)),
                ))),
                SourceConfig::Duckdb { path } => {
                    let path = config.resolve_path(path);
                    match shared(&path) {
                        Some(opened) => {
                            debug!("Source '{}' shares the control database", name);
                            opened?
                        }
                        None => open_sql(name, &path)?,
                    }
                }
            };
            debug!("Opened source '{}'", name);
            configured.sources.insert(name.clone(), opened);
        }
        Ok(configured)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl RowSource for ConfiguredSource {
    fn fetch(&self, table: &TableConfig, period: Period) -> Result<RowSet, SourceError> {
        let source = self
            .sources
            .get(&table.source)
            .ok_or_else(|| SourceError::UnknownSource {
                table: table.name.clone(),
                source_name: table.source.clone(),
            })?;
        source.fetch(table, period)
    }
}

#[cfg(feature = "duckdb-backend")]
fn open_sql(_name: &str, path: &Path) -> Result<Box<dyn RowSource>, SourceError> {
    Ok(Box::new(SqlSource::open(path)?))
}

#[cfg(not(feature = "duckdb-backend"))]
fn open_sql(name: &str, _path: &Path) -> Result<Box<dyn RowSource>, SourceError> {
    Err(SourceError::InvalidTable {
        table: name.to_string(),
        message: "DuckDB sources need the duckdb-backend feature".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    struct Fixed(RowSet);

    impl RowSource for Fixed {
        fn fetch(&self, _table: &TableConfig, _period: Period) -> Result<RowSet, SourceError> {
            Ok(self.0.clone())
        }
    }

    fn table(source: &str) -> TableConfig {
        toml::from_str(&format!("name = \"t\"\nsource = \"{}\"\nquery = \"SELECT 1\"", source))
            .unwrap()
    }

    #[test]
    fn test_routes_by_source_name() {
        let rows =
            RowSet::from_rows(vec!["id".to_string()], vec![vec![Value::Int(1)]]).unwrap();
        let source = ConfiguredSource::new().with_source("db", Box::new(Fixed(rows.clone())));
        let period: Period = "20240105".parse().unwrap();

        assert_eq!(source.fetch(&table("db"), period).unwrap(), rows);
        assert!(matches!(
            source.fetch(&table("ghost"), period),
            Err(SourceError::UnknownSource { .. })
        ));
    }
}
