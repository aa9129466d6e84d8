//! SQL source over a DuckDB database

use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use super::{RowSource, SourceError};
use crate::config::TableConfig;
use crate::database::duckdb::query_row_set;
use crate::models::RowSet;
use crate::period::Period;

/// Runs each table's query with every parameter bound to the period date
pub struct SqlSource {
    connection: Mutex<duckdb::Connection>,
}

impl SqlSource {
    /// Open a database file
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let connection =
            duckdb::Connection::open(path).map_err(|e| SourceError::Database {
                table: path.display().to_string(),
                message: format!("Failed to open: {}", e),
            })?;
        Ok(Self::from_connection(connection))
    }

    /// Wrap an existing connection, e.g. one cloned from the control store
    pub fn from_connection(connection: duckdb::Connection) -> Self {
        Self {
            connection: Mutex::new(connection),
        }
    }
}

impl RowSource for SqlSource {
    fn fetch(&self, table: &TableConfig, period: Period) -> Result<RowSet, SourceError> {
        let sql = table
            .query
            .as_deref()
            .ok_or_else(|| SourceError::InvalidTable {
                table: table.name.clone(),
                message: "no query configured".to_string(),
            })?;
        let conn = self.connection.lock().map_err(|e| SourceError::Database {
            table: table.name.clone(),
            message: format!("Lock error: {}", e),
        })?;

        let date = period.iso_date();
        let rows = query_row_set(&conn, sql, |count| {
            vec![duckdb::types::Value::Text(date.clone()); count]
        })
        .map_err(|e| SourceError::Database {
            table: table.name.clone(),
            message: e.to_string(),
        })?;

        debug!(
            "Fetched {} row(s) for table '{}' ({})",
            rows.len(),
            table.name,
            period
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Value;

    fn source() -> SqlSource {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE licitacoes (id BIGINT, objeto VARCHAR, data_publicacao DATE);
             INSERT INTO licitacoes VALUES
                (1, 'Papel', DATE '2024-01-05'),
                (2, 'Toner', DATE '2024-01-05'),
                (3, 'Cadeira', DATE '2024-01-06');",
        )
        .unwrap();
        SqlSource::from_connection(conn)
    }

    fn table(query: &str) -> TableConfig {
        toml::from_str(&format!(
            "name = \"licitacoes\"\nsource = \"db\"\nquery = \"{}\"",
            query
        ))
        .unwrap()
    }

    #[test]
    fn test_period_is_bound_to_every_parameter() {
        let t = table(
            "SELECT id, objeto FROM licitacoes WHERE data_publicacao = CAST($1 AS DATE) ORDER BY id",
        );
        let rows = source().fetch(&t, "20240105".parse().unwrap()).unwrap();
        assert_eq!(rows.columns(), &["id".to_string(), "objeto".to_string()][..]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows()[1][1], Value::from("Toner"));
    }

    #[test]
    fn test_query_without_parameters() {
        let t = table("SELECT count(*) AS n FROM licitacoes");
        let rows = source().fetch(&t, "20240105".parse().unwrap()).unwrap();
        assert_eq!(rows.rows()[0][0], Value::Int(3));
    }

    #[test]
    fn test_bad_query_is_a_source_error() {
        let t = table("SELECT * FROM nowhere");
        assert!(matches!(
            source().fetch(&t, "20240105".parse().unwrap()),
            Err(SourceError::Database { .. })
        ));
    }
}
