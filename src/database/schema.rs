//! Control table definitions

use crate::validation::{IdentifierError, quote_identifier, validate_identifier};

/// Default name of the control table
pub const DEFAULT_CONTROL_TABLE: &str = "controle_carga";

/// SQL for one control table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlSchema {
    table: String,
}

impl ControlSchema {
    /// Control schema for `table`, which must be a plain identifier
    pub fn new(table: impl Into<String>) -> Result<Self, IdentifierError> {
        let table = table.into();
        validate_identifier("control table", &table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn sequence(&self) -> String {
        format!("{}_id_seq", self.table)
    }

    /// Sequence and table creation
    pub fn create_sql(&self) -> String {
        format!(
            r#"
CREATE SEQUENCE IF NOT EXISTS {seq} START 1;
CREATE TABLE IF NOT EXISTS {table} (
    id BIGINT PRIMARY KEY DEFAULT nextval('{seq_name}'),
    period BIGINT NOT NULL,
    started_at TIMESTAMP NOT NULL,
    finished_at TIMESTAMP
);
"#,
            seq = quote_identifier(&self.sequence()),
            seq_name = self.sequence(),
            table = quote_identifier(&self.table),
        )
    }

    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {} (period, started_at) VALUES (?, CAST(? AS TIMESTAMP)) RETURNING id",
            quote_identifier(&self.table)
        )
    }

    pub fn finish_sql(&self) -> String {
        format!(
            "UPDATE {} SET finished_at = CAST(? AS TIMESTAMP) WHERE id = ?",
            quote_identifier(&self.table)
        )
    }

    /// Latest record for one period
    pub fn latest_sql(&self) -> String {
        format!(
            "{} WHERE period = ? ORDER BY id DESC LIMIT 1",
            self.select_columns()
        )
    }

    pub fn between_sql(&self) -> String {
        format!(
            "{} WHERE period BETWEEN ? AND ? ORDER BY id",
            self.select_columns()
        )
    }

    fn select_columns(&self) -> String {
        format!(
            "SELECT id, period, CAST(started_at AS VARCHAR), CAST(finished_at AS VARCHAR) FROM {}",
            quote_identifier(&self.table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_schema_sql() {
        let schema = ControlSchema::new(DEFAULT_CONTROL_TABLE).unwrap();
        let ddl = schema.create_sql();
        assert!(ddl.contains("CREATE TABLE IF NOT EXISTS \"controle_carga\""));
        assert!(ddl.contains("nextval('controle_carga_id_seq')"));
        assert!(schema.latest_sql().ends_with("ORDER BY id DESC LIMIT 1"));
    }

    #[test]
    fn test_control_table_must_be_identifier() {
        assert!(ControlSchema::new("bad name").is_err());
        assert!(ControlSchema::new("x\"; DROP").is_err());
    }
}
