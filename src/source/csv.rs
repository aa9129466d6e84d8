//! Delimited-file source on a storage backend

use tracing::{debug, warn};

use super::{RowSource, SourceError};
use crate::config::TableConfig;
use crate::models::{RowSet, Value};
use crate::period::Period;
use crate::storage::StorageBackend;

/// Reads `<root>/<file pattern>` with `{period}` replaced by the period key.
///
/// The first record is the header. Cells are coerced with
/// [`Value::infer_from_str`] and fully blank lines are dropped. When the
/// table declares a column mapping only the mapped columns are kept.
pub struct CsvSource {
    storage: Box<dyn StorageBackend>,
}

impl CsvSource {
    pub fn new(storage: Box<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    fn parse(&self, table: &TableConfig, path: &str, content: &[u8]) -> Result<RowSet, SourceError> {
        let delimiter = u8::try_from(table.delimiter).map_err(|_| SourceError::InvalidTable {
            table: table.name.clone(),
            message: format!("delimiter '{}' is not a single byte", table.delimiter),
        })?;
        let csv_error = |e: csv::Error| SourceError::Csv {
            path: path.to_string(),
            message: e.to_string(),
        };

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(content);

        let columns: Vec<String> = reader
            .byte_headers()
            .map_err(csv_error)?
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();

        let mut rows = RowSet::new(columns.clone());
        for record in reader.byte_records() {
            let record = record.map_err(csv_error)?;
            let mut cells: Vec<Value> = record
                .iter()
                .take(columns.len())
                .map(|cell| Value::infer_from_str(&String::from_utf8_lossy(cell)))
                .collect();
            cells.resize(columns.len(), Value::Null);
            rows.push_row(cells).map_err(|source| SourceError::Rows {
                table: table.name.clone(),
                source,
            })?;
        }

        let dropped = rows.drop_blank_rows();
        if dropped > 0 {
            debug!("Dropped {} blank line(s) from {}", dropped, path);
        }

        if table.columns.is_empty() {
            return Ok(rows);
        }
        rows.select(&table.source_columns())
            .map_err(|source| SourceError::Rows {
                table: table.name.clone(),
                source,
            })
    }
}

impl RowSource for CsvSource {
    fn fetch(&self, table: &TableConfig, period: Period) -> Result<RowSet, SourceError> {
        let path = table
            .file_for(&period.key())
            .ok_or_else(|| SourceError::InvalidTable {
                table: table.name.clone(),
                message: "no file pattern configured".to_string(),
            })?;

        if !self.storage.file_exists(&path)? {
            if table.missing_ok {
                warn!(
                    "{} not found in {}; table '{}' is empty for {}",
                    path,
                    self.storage.describe(),
                    table.name,
                    period.display_date()
                );
                return Ok(RowSet::new(table.source_columns()));
            }
            return Err(SourceError::MissingFile(path));
        }

        let content = self.storage.read_file(&path)?;
        let rows = self.parse(table, &path, &content)?;
        debug!(
            "Read {} row(s) for table '{}' from {}",
            rows.len(),
            table.name,
            path
        );
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::filesystem::FileSystemStorageBackend;
    use tempfile::tempdir;

    fn table(extra: &str) -> TableConfig {
        toml::from_str(&format!(
            "name = \"resultado\"\nsource = \"files\"\nfile = \"{{period}}/licitacoes.csv\"\n{}",
            extra
        ))
        .unwrap()
    }

    fn period() -> Period {
        "20240105".parse().unwrap()
    }

    #[test]
    fn test_reads_and_coerces_cells() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        storage
            .write_file(
                "20240105/licitacoes.csv",
                "ID;RISCO;OBS\n1;0.75;ok\n;;\n2;1;\n".as_bytes(),
            )
            .unwrap();

        let rows = CsvSource::new(Box::new(storage))
            .fetch(&table(""), period())
            .unwrap();
        assert_eq!(rows.columns().len(), 3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows()[0], vec![Value::Int(1), Value::Float(0.75), Value::from("ok")]);
        assert_eq!(rows.rows()[1][2], Value::Null);
    }

    #[test]
    fn test_mapping_projects_columns() {
        let dir = tempdir().unwrap();
        let storage = FileSystemStorageBackend::new(dir.path());
        storage
            .write_file("20240105/licitacoes.csv", b"A,B,C\n1,2,3\n")
            .unwrap();

        let t = table("delimiter = \",\"\n[columns]\nC = \"c\"\nA = \"a\"\n");
        let rows = CsvSource::new(Box::new(storage)).fetch(&t, period()).unwrap();
        assert_eq!(rows.columns(), &["C".to_string(), "A".to_string()][..]);
        assert_eq!(rows.rows()[0], vec![Value::Int(3), Value::Int(1)]);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let source = CsvSource::new(Box::new(FileSystemStorageBackend::new(dir.path())));

        assert!(matches!(
            source.fetch(&table(""), period()),
            Err(SourceError::MissingFile(_))
        ));
        let empty = source.fetch(&table("missing_ok = true"), period()).unwrap();
        assert!(empty.is_empty());
    }
}
