//! Period metadata export
//!
//! Each row of the main table becomes one JSON object. Rows of the nested
//! tables are attached to the object sharing their entity id, as an array
//! under the nested table's name. The entity column is left out of nested
//! rows, and an entity without nested rows gets `null`.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::{ExportError, ExportResult};
use crate::models::{RowSet, Value};

/// Writes the main table with its nested tables as a JSON array
pub struct MetadataExporter {
    entity_column: String,
}

impl MetadataExporter {
    pub fn new(entity_column: impl Into<String>) -> Self {
        Self {
            entity_column: entity_column.into(),
        }
    }

    /// Export `main` with `nested` tables attached per entity.
    ///
    /// Output is indented by four spaces, floats are rounded to two
    /// decimals, newlines inside text become spaces and non-ASCII text is
    /// kept as is.
    pub fn export(
        &self,
        main_name: &str,
        main: &RowSet,
        nested: &[(&str, &RowSet)],
    ) -> Result<ExportResult, ExportError> {
        let main_idx = self.entity_index(main_name, main)?;

        let mut grouped: Vec<(&str, IndexMap<String, Vec<JsonValue>>)> = Vec::new();
        for (name, rows) in nested {
            let idx = self.entity_index(name, rows)?;
            let mut by_entity: IndexMap<String, Vec<JsonValue>> = IndexMap::new();
            for row in rows.rows() {
                if let Some(key) = row[idx].lookup_key() {
                    let mut child = record(rows.columns(), row);
                    child.shift_remove(&self.entity_column);
                    by_entity
                        .entry(key)
                        .or_default()
                        .push(JsonValue::Object(child));
                }
            }
            grouped.push((name, by_entity));
        }

        let records: Vec<JsonValue> = main
            .rows()
            .iter()
            .map(|row| {
                let mut object = record(main.columns(), row);
                let key = row[main_idx].lookup_key();
                for (name, by_entity) in &grouped {
                    let children = key
                        .as_ref()
                        .and_then(|k| by_entity.get(k))
                        .map_or(JsonValue::Null, |c| JsonValue::Array(c.clone()));
                    object.insert(name.to_string(), children);
                }
                JsonValue::Object(object)
            })
            .collect();

        let count = records.len();
        Ok(ExportResult {
            content: to_pretty_json(&records)?,
            format: "json".to_string(),
            records: count,
        })
    }

    fn entity_index(&self, table: &str, rows: &RowSet) -> Result<usize, ExportError> {
        rows.column_index(&self.entity_column)
            .ok_or_else(|| ExportError::MissingEntityColumn {
                table: table.to_string(),
                column: self.entity_column.clone(),
            })
    }
}

fn record(columns: &[String], row: &[Value]) -> Map<String, JsonValue> {
    columns
        .iter()
        .zip(row)
        .map(|(c, v)| (c.clone(), cell_json(v)))
        .collect()
}

fn cell_json(value: &Value) -> JsonValue {
    match value {
        Value::Float(f) => serde_json::Number::from_f64((f * 100.0).round() / 100.0)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.replace("\r\n", " ").replace(['\n', '\r'], " ")),
        other => other.to_json(),
    }
}

fn to_pretty_json(records: &[JsonValue]) -> Result<String, ExportError> {
    let mut buffer = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
    records
        .serialize(&mut serializer)
        .map_err(|e| ExportError::SerializationError(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| ExportError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn licitacoes() -> RowSet {
        let published = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap();
        RowSet::from_rows(
            cols(&["id_licitacao", "objeto", "valor", "publicacao"]),
            vec![
                vec![
                    Value::Int(1),
                    Value::from("Aquisição de\npapel"),
                    Value::Float(1234.5678),
                    Value::DateTime(published),
                ],
                vec![Value::Int(2), Value::from("Toner"), Value::Null, Value::Null],
            ],
        )
        .unwrap()
    }

    fn itens() -> RowSet {
        RowSet::from_rows(
            cols(&["id_licitacao", "descricao"]),
            vec![
                vec![Value::Int(1), Value::from("A4")],
                vec![Value::Int(1), Value::from("A3")],
                vec![Value::Int(9), Value::from("orphan")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_nesting_and_formatting() {
        let result = MetadataExporter::new("id_licitacao")
            .export("licitacoes", &licitacoes(), &[("itens", &itens())])
            .unwrap();
        assert_eq!(result.records, 2);

        let parsed: JsonValue = serde_json::from_str(&result.content).unwrap();
        let first = &parsed[0];
        assert_eq!(first["objeto"], "Aquisição de papel");
        assert_eq!(first["valor"], 1234.57);
        assert_eq!(first["publicacao"], "2024-01-05T08:30:00");
        assert_eq!(first["itens"].as_array().unwrap().len(), 2);
        assert_eq!(first["itens"][1]["descricao"], "A3");
        assert_eq!(parsed[1]["itens"], JsonValue::Null);

        assert!(result.content.contains("Aquisição"));
        assert!(result.content.contains("\n    {\n        \"id_licitacao\": 1,"));
    }

    #[test]
    fn test_nested_rows_leave_out_entity_column() {
        let result = MetadataExporter::new("id_licitacao")
            .export("licitacoes", &licitacoes(), &[("itens", &itens())])
            .unwrap();
        let parsed: JsonValue = serde_json::from_str(&result.content).unwrap();
        let child = parsed[0]["itens"][0].as_object().unwrap();
        assert_eq!(child.len(), 1);
        assert!(!child.contains_key("id_licitacao"));
        assert_eq!(child["descricao"], "A4");
    }

    #[test]
    fn test_field_order_follows_columns() {
        let result = MetadataExporter::new("id_licitacao")
            .export("licitacoes", &licitacoes(), &[])
            .unwrap();
        let id = result.content.find("id_licitacao").unwrap();
        let objeto = result.content.find("objeto").unwrap();
        let valor = result.content.find("valor").unwrap();
        assert!(id < objeto && objeto < valor);
    }

    #[test]
    fn test_missing_entity_column() {
        let orphan = RowSet::from_rows(cols(&["x"]), vec![]).unwrap();
        let err = MetadataExporter::new("id_licitacao")
            .export("licitacoes", &licitacoes(), &[("itens", &orphan)])
            .unwrap_err();
        assert!(matches!(err, ExportError::MissingEntityColumn { .. }));
    }
}
