//! DuckDB control store
//!
//! Holds the control table and the destination tables in one embedded
//! database. Supports both file-based persistence and in-memory mode.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use super::schema::ControlSchema;
use super::{ControlStore, ControlTransaction, DatabaseError, DatabaseResult};
use crate::models::{ControlRecord, InferredType, RowSet, Value};
use crate::period::Period;
use crate::validation::{quote_identifier, quote_table_name, validate_identifier, validate_table_name};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// DuckDB control store
pub struct DuckDbStore {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
    schema: ControlSchema,
}

impl DuckDbStore {
    /// Open (or create) a file-based database
    pub fn new(db_path: impl AsRef<Path>, control_table: &str) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB {}: {}", path.display(), e))
        })?;
        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
            schema: Self::control_schema(control_table)?,
        })
    }

    /// Create an in-memory database
    ///
    /// Useful for testing and dry runs where persistence is not needed.
    pub fn in_memory(control_table: &str) -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;
        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
            schema: Self::control_schema(control_table)?,
        })
    }

    fn control_schema(table: &str) -> DatabaseResult<ControlSchema> {
        ControlSchema::new(table).map_err(|e| DatabaseError::InvalidInput(e.to_string()))
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> DatabaseResult<MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Open another connection to the same database
    pub fn clone_connection(&self) -> DatabaseResult<duckdb::Connection> {
        self.lock()?
            .try_clone()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Failed to clone connection: {}", e)))
    }

    /// Run a read-only query outside any load transaction
    pub fn query(&self, sql: &str) -> DatabaseResult<RowSet> {
        let conn = self.lock()?;
        query_row_set(&conn, sql, |_| Vec::new())
    }
}

impl ControlStore for DuckDbStore {
    fn initialize(&self) -> DatabaseResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&self.schema.create_sql()).map_err(|e| {
            DatabaseError::MigrationFailed(format!(
                "Failed to create control table {}: {}",
                self.schema.table(),
                e
            ))
        })
    }

    fn is_initialized(&self) -> DatabaseResult<bool> {
        let conn = self.lock()?;
        table_exists(&conn, self.schema.table())
    }

    fn with_transaction(
        &self,
        body: &mut dyn FnMut(&mut dyn ControlTransaction) -> DatabaseResult<()>,
    ) -> DatabaseResult<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to begin: {}", e)))?;

        let outcome = body(&mut DuckDbTransaction {
            conn: &tx,
            schema: &self.schema,
        });

        match outcome {
            Ok(()) => tx
                .commit()
                .map_err(|e| DatabaseError::TransactionFailed(format!("Failed to commit: {}", e))),
            Err(e) => {
                if let Err(rollback) = tx.rollback() {
                    warn!("Rollback failed after error '{}': {}", e, rollback);
                }
                Err(e)
            }
        }
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }
}

struct DuckDbTransaction<'a> {
    conn: &'a duckdb::Connection,
    schema: &'a ControlSchema,
}

impl DuckDbTransaction<'_> {
    fn read_records(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
    ) -> DatabaseResult<Vec<ControlRecord>> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                ))
            })
            .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let (id, period, started_at, finished_at) =
                row.map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?;
            records.push(ControlRecord {
                id,
                period: Period::from_int(period)
                    .map_err(|e| DatabaseError::SerializationError(e.to_string()))?,
                started_at: parse_timestamp(&started_at)?,
                finished_at: finished_at.as_deref().map(parse_timestamp).transpose()?,
            });
        }
        Ok(records)
    }
}

impl ControlTransaction for DuckDbTransaction<'_> {
    fn latest_record(&mut self, period: Period) -> DatabaseResult<Option<ControlRecord>> {
        let records = self.read_records(&self.schema.latest_sql(), duckdb::params![period.as_int()])?;
        Ok(records.into_iter().next())
    }

    fn insert_record(
        &mut self,
        period: Period,
        started_at: NaiveDateTime,
    ) -> DatabaseResult<ControlRecord> {
        let id: i64 = self
            .conn
            .query_row(
                &self.schema.insert_sql(),
                duckdb::params![period.as_int(), format_timestamp(&started_at)],
                |row| row.get(0),
            )
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to insert control record: {}", e)))?;
        debug!("Inserted control record {} for {}", id, period);
        Ok(ControlRecord {
            id,
            period,
            started_at,
            finished_at: None,
        })
    }

    fn finish_record(&mut self, id: i64, finished_at: NaiveDateTime) -> DatabaseResult<()> {
        let updated = self
            .conn
            .execute(
                &self.schema.finish_sql(),
                duckdb::params![format_timestamp(&finished_at), id],
            )
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to finish record: {}", e)))?;
        if updated == 0 {
            return Err(DatabaseError::InvalidInput(format!(
                "Control record {} not found",
                id
            )));
        }
        Ok(())
    }

    fn records_between(
        &mut self,
        start: Period,
        end: Period,
    ) -> DatabaseResult<Vec<ControlRecord>> {
        self.read_records(
            &self.schema.between_sql(),
            duckdb::params![start.as_int(), end.as_int()],
        )
    }

    fn delete_period_rows(
        &mut self,
        table: &str,
        period_column: &str,
        period: Period,
    ) -> DatabaseResult<usize> {
        check_names(table, [period_column])?;
        if !table_exists(self.conn, table)? {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_table_name(table),
            quote_identifier(period_column)
        );
        self.conn
            .execute(&sql, duckdb::params![period.as_int()])
            .map_err(|e| DatabaseError::QueryFailed(format!("Failed to clean {}: {}", table, e)))
    }

    fn append_rows(&mut self, table: &str, rows: &RowSet) -> DatabaseResult<usize> {
        check_names(table, rows.columns().iter().map(String::as_str))?;
        if !table_exists(self.conn, table)? {
            let ddl = create_table_sql(table, rows);
            debug!("Creating destination table: {}", ddl);
            self.conn
                .execute_batch(&ddl)
                .map_err(|e| DatabaseError::QueryFailed(format!("Failed to create {}: {}", table, e)))?;
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let columns: Vec<String> = rows.columns().iter().map(|c| quote_identifier(c)).collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_table_name(table),
            columns.join(", "),
            placeholders
        );
        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
        for row in rows.rows() {
            stmt.execute(duckdb::params_from_iter(row.iter().map(to_duckdb_value)))
                .map_err(|e| DatabaseError::QueryFailed(format!("Insert into {} failed: {}", table, e)))?;
        }
        Ok(rows.len())
    }
}

fn check_names<'a>(table: &str, columns: impl IntoIterator<Item = &'a str>) -> DatabaseResult<()> {
    validate_table_name(table).map_err(|e| DatabaseError::InvalidInput(e.to_string()))?;
    for column in columns {
        validate_identifier("column", column).map_err(|e| DatabaseError::InvalidInput(e.to_string()))?;
    }
    Ok(())
}

fn table_exists(conn: &duckdb::Connection, table: &str) -> DatabaseResult<bool> {
    let (schema, name) = table.split_once('.').unwrap_or(("main", table));
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
            duckdb::params![schema, name],
            |row| row.get(0),
        )
        .map_err(|e| DatabaseError::QueryFailed(format!("Failed to inspect {}: {}", table, e)))?;
    Ok(count > 0)
}

fn create_table_sql(table: &str, rows: &RowSet) -> String {
    let columns: Vec<String> = rows
        .columns()
        .iter()
        .map(|name| {
            let kind = rows
                .column_values(name)
                .and_then(InferredType::of_column)
                .map_or("VARCHAR", sql_type);
            format!("{} {}", quote_identifier(name), kind)
        })
        .collect();
    format!(
        "CREATE TABLE {} ({})",
        quote_table_name(table),
        columns.join(", ")
    )
}

fn sql_type(kind: InferredType) -> &'static str {
    match kind {
        InferredType::Bool => "BOOLEAN",
        InferredType::Int => "BIGINT",
        InferredType::Float => "DOUBLE",
        InferredType::DateTime => "TIMESTAMP",
        InferredType::Str => "VARCHAR",
    }
}

fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

fn parse_timestamp(raw: &str) -> DatabaseResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map_err(|e| DatabaseError::SerializationError(format!("Bad timestamp '{}': {}", raw, e)))
}

/// Convert a cell into a DuckDB parameter
pub(crate) fn to_duckdb_value(value: &Value) -> duckdb::types::Value {
    use duckdb::types::Value as Db;

    match value {
        Value::Null => Db::Null,
        Value::Bool(b) => Db::Boolean(*b),
        Value::Int(i) => Db::BigInt(*i),
        Value::Float(f) => Db::Double(*f),
        Value::DateTime(dt) => Db::Text(format_timestamp(dt)),
        Value::Text(s) => Db::Text(s.clone()),
    }
}

/// Convert a DuckDB ValueRef to a cell
pub(crate) fn value_ref_to_value(value: duckdb::types::ValueRef) -> Value {
    use duckdb::types::ValueRef;

    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Boolean(b) => Value::Bool(b),
        ValueRef::TinyInt(i) => Value::Int(i.into()),
        ValueRef::SmallInt(i) => Value::Int(i.into()),
        ValueRef::Int(i) => Value::Int(i.into()),
        ValueRef::BigInt(i) => Value::Int(i),
        ValueRef::HugeInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(i.to_string())),
        ValueRef::UTinyInt(i) => Value::Int(i.into()),
        ValueRef::USmallInt(i) => Value::Int(i.into()),
        ValueRef::UInt(i) => Value::Int(i.into()),
        ValueRef::UBigInt(i) => i64::try_from(i)
            .map(Value::Int)
            .unwrap_or_else(|_| Value::Text(i.to_string())),
        ValueRef::Float(f) => Value::Float(f.into()),
        ValueRef::Double(f) => Value::Float(f),
        ValueRef::Decimal(d) => d
            .to_string()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(d.to_string())),
        ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => {
            // Encode blob as base64
            use base64::Engine;
            Value::Text(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        ValueRef::Timestamp(unit, raw) => timestamp_to_datetime(unit, raw)
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        ValueRef::Date32(days) => NaiveDate::from_ymd_opt(1970, 1, 1)
            .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(days.into())))
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(Value::DateTime)
            .unwrap_or(Value::Null),
        other => Value::Text(format!("{:?}", other)),
    }
}

fn timestamp_to_datetime(unit: duckdb::types::TimeUnit, raw: i64) -> Option<NaiveDateTime> {
    use duckdb::types::TimeUnit;

    let micros = match unit {
        TimeUnit::Second => raw.checked_mul(1_000_000)?,
        TimeUnit::Millisecond => raw.checked_mul(1_000)?,
        TimeUnit::Microsecond => raw,
        TimeUnit::Nanosecond => raw / 1_000,
    };
    DateTime::from_timestamp_micros(micros).map(|dt| dt.naive_utc())
}

/// Run a query and collect its result as a row set.
///
/// `bind` receives the statement's parameter count and returns the values
/// to bind.
pub(crate) fn query_row_set(
    conn: &duckdb::Connection,
    sql: &str,
    bind: impl FnOnce(usize) -> Vec<duckdb::types::Value>,
) -> DatabaseResult<RowSet> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| DatabaseError::QueryFailed(format!("Prepare failed: {}", e)))?;
    let params = bind(stmt.parameter_count());

    // In DuckDB 1.4+, we need to execute the query first, then get columns
    let mut result_rows = stmt
        .query(duckdb::params_from_iter(params))
        .map_err(|e| DatabaseError::QueryFailed(format!("Query failed: {}", e)))?;

    let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
    let columns: Vec<String> = (0..column_count)
        .map(|i| {
            result_rows
                .as_ref()
                .and_then(|r| r.column_name(i).ok())
                .map(|s| s.to_string())
                .unwrap_or_else(|| format!("col{}", i))
        })
        .collect();

    let mut rows = Vec::new();
    while let Some(row) = result_rows
        .next()
        .map_err(|e| DatabaseError::QueryFailed(format!("Row fetch error: {}", e)))?
    {
        let cells = (0..column_count)
            .map(|i| row.get_ref(i).map(value_ref_to_value).unwrap_or(Value::Null))
            .collect();
        rows.push(cells);
    }

    RowSet::from_rows(columns, rows).map_err(|e| DatabaseError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{schema::DEFAULT_CONTROL_TABLE, transaction};
    use chrono::NaiveDate;

    fn store() -> DuckDbStore {
        let store = DuckDbStore::in_memory(DEFAULT_CONTROL_TABLE).unwrap();
        store.initialize().unwrap();
        store
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, 30, 0)
            .unwrap()
    }

    fn day(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_in_memory_database() {
        let store = DuckDbStore::in_memory(DEFAULT_CONTROL_TABLE).unwrap();
        assert!(store.is_in_memory());
        assert!(store.db_path().is_none());
        assert!(!store.is_initialized().unwrap());
        store.initialize().unwrap();
        assert!(store.is_initialized().unwrap());
        store.initialize().unwrap();
    }

    #[test]
    fn test_control_record_lifecycle() {
        let store = store();
        let first = transaction(&store, |tx| tx.insert_record(day("20240229"), at(1))).unwrap();
        let second = transaction(&store, |tx| tx.insert_record(day("20240229"), at(2))).unwrap();
        assert!(second.id > first.id);

        transaction(&store, |tx| tx.finish_record(second.id, at(3))).unwrap();

        let latest = transaction(&store, |tx| tx.latest_record(day("20240229")))
            .unwrap()
            .unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.started_at, at(2));
        assert_eq!(latest.finished_at, Some(at(3)));

        let listed =
            transaction(&store, |tx| tx.records_between(day("20240201"), day("20240301"))).unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_rollback_discards_insert() {
        let store = store();
        let result: DatabaseResult<()> = transaction(&store, |tx| {
            tx.insert_record(day("20240101"), at(1))?;
            Err(DatabaseError::QueryFailed("forced".to_string()))
        });
        assert!(result.is_err());
        let latest = transaction(&store, |tx| tx.latest_record(day("20240101"))).unwrap();
        assert!(latest.is_none());
    }

    #[test]
    fn test_append_creates_table_and_delete_is_scoped() {
        let store = store();
        let batch = |period: i64| {
            RowSet::from_rows(
                vec!["id".to_string(), "valor".to_string(), "data_carga".to_string()],
                vec![
                    vec![Value::Int(1), Value::Float(2.5), Value::Int(period)],
                    vec![Value::Int(2), Value::Null, Value::Int(period)],
                ],
            )
            .unwrap()
        };

        transaction(&store, |tx| {
            assert_eq!(tx.delete_period_rows("itens", "data_carga", day("20240101"))?, 0);
            tx.append_rows("itens", &batch(20240101))?;
            tx.append_rows("itens", &batch(20240102))
        })
        .unwrap();

        let removed = transaction(&store, |tx| {
            tx.delete_period_rows("itens", "data_carga", day("20240101"))
        })
        .unwrap();
        assert_eq!(removed, 2);

        let remaining = store.query("SELECT id, valor, data_carga FROM itens ORDER BY id").unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining.rows()[0][1], Value::Float(2.5));
        assert_eq!(remaining.rows()[1][2], Value::Int(20240102));
    }

    #[test]
    fn test_invalid_names_rejected() {
        let store = store();
        let err = transaction(&store, |tx| {
            tx.delete_period_rows("itens; DROP TABLE x", "data_carga", day("20240101"))
        })
        .unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidInput(_)));
    }

    #[test]
    fn test_value_mapping_roundtrip_types() {
        let store = store();
        let rows = store
            .query("SELECT 1::INTEGER AS i, 2.5::DOUBLE AS f, 'x' AS t, TIMESTAMP '2024-01-02 03:04:05' AS ts, NULL AS n")
            .unwrap();
        assert_eq!(rows.columns(), &["i", "f", "t", "ts", "n"]);
        let row = &rows.rows()[0];
        assert_eq!(row[0], Value::Int(1));
        assert_eq!(row[1], Value::Float(2.5));
        assert_eq!(row[2], Value::from("x"));
        assert_eq!(
            row[3],
            Value::DateTime(
                NaiveDate::from_ymd_opt(2024, 1, 2)
                    .unwrap()
                    .and_hms_opt(3, 4, 5)
                    .unwrap()
            )
        );
        assert_eq!(row[4], Value::Null);
    }
}
