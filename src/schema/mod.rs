//! Declarative table schemas
//!
//! A schema entry maps each column of a table to a [`ColumnRule`]. Entries
//! are parsed once, when the configuration is loaded, from either inline
//! TOML or an external YAML file, using the keys
//! `obrigatorio`/`required`, `tipo`/`type`, `enum` and `ref`.

pub mod registry;

pub use registry::SchemaRegistry;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::{InferredType, Value};

/// Error type for schema parsing and ordering
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Unknown column type '{0}'. Use str, int, float or datetime")]
    UnknownType(String),

    #[error("Invalid required flag '{0}'. Use S/N or true/false")]
    InvalidRequiredFlag(String),

    #[error("Invalid reference '{0}'. Use table.column")]
    InvalidReference(String),

    #[error("Reference cycle between tables: {}", .0.join(" -> "))]
    ReferenceCycle(Vec<String>),

    #[error("Failed to parse schema file {path}: {message}")]
    Parse { path: String, message: String },
}

/// Declared type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Str,
    Int,
    Float,
    DateTime,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Str => "str",
            ColumnType::Int => "int",
            ColumnType::Float => "float",
            ColumnType::DateTime => "datetime",
        }
    }

    /// Whether an inferred runtime type is exactly this declared type
    pub fn matches(&self, inferred: InferredType) -> bool {
        matches!(
            (self, inferred),
            (ColumnType::Str, InferredType::Str)
                | (ColumnType::Int, InferredType::Int)
                | (ColumnType::Float, InferredType::Float)
                | (ColumnType::DateTime, InferredType::DateTime)
        )
    }
}

impl FromStr for ColumnType {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "str" | "string" | "text" => Ok(ColumnType::Str),
            "int" | "integer" => Ok(ColumnType::Int),
            "float" | "double" => Ok(ColumnType::Float),
            "datetime" | "timestamp" => Ok(ColumnType::DateTime),
            _ => Err(SchemaError::UnknownType(s.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Cross-table reference `table.column`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
}

impl FromStr for ForeignKeyRef {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => Ok(Self {
                table: table.to_string(),
                column: column.to_string(),
            }),
            _ => Err(SchemaError::InvalidReference(s.to_string())),
        }
    }
}

impl fmt::Display for ForeignKeyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

impl Serialize for ForeignKeyRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Required flag as written in configuration: `"S"`/`"N"` or a boolean
#[derive(Deserialize)]
#[serde(untagged)]
enum RequiredFlag {
    Bool(bool),
    Text(String),
}

impl TryFrom<RequiredFlag> for bool {
    type Error = SchemaError;

    fn try_from(flag: RequiredFlag) -> Result<Self, Self::Error> {
        match flag {
            RequiredFlag::Bool(b) => Ok(b),
            RequiredFlag::Text(s) => match s.trim().to_uppercase().as_str() {
                "S" | "SIM" | "Y" | "YES" | "TRUE" => Ok(true),
                "N" | "NAO" | "NÃO" | "NO" | "FALSE" => Ok(false),
                _ => Err(SchemaError::InvalidRequiredFlag(s)),
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawColumnRule {
    #[serde(alias = "required", default)]
    obrigatorio: Option<RequiredFlag>,
    #[serde(alias = "type")]
    tipo: ColumnType,
    #[serde(rename = "enum", default)]
    allowed: Option<Vec<Value>>,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
}

/// Rules for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawColumnRule")]
pub struct ColumnRule {
    pub required: bool,
    #[serde(rename = "type")]
    pub kind: ColumnType,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub allowed: Option<Vec<Value>>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<ForeignKeyRef>,
}

impl TryFrom<RawColumnRule> for ColumnRule {
    type Error = SchemaError;

    fn try_from(raw: RawColumnRule) -> Result<Self, Self::Error> {
        let required = match raw.obrigatorio {
            Some(flag) => bool::try_from(flag)?,
            None => false,
        };
        let reference = raw.reference.as_deref().map(str::parse).transpose()?;
        Ok(Self {
            required,
            kind: raw.tipo,
            allowed: raw.allowed,
            reference,
        })
    }
}

impl ColumnRule {
    pub fn new(required: bool, kind: ColumnType) -> Self {
        Self {
            required,
            kind,
            allowed: None,
            reference: None,
        }
    }

    pub fn with_allowed(mut self, values: Vec<Value>) -> Self {
        self.allowed = Some(values);
        self
    }

    pub fn with_reference(mut self, table: &str, column: &str) -> Self {
        self.reference = Some(ForeignKeyRef {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }
}

/// Ordered column rules for one table
pub type SchemaEntry = IndexMap<String, ColumnRule>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_portuguese_keys_from_yaml() {
        let yaml = r#"
id_licitacao:
  obrigatorio: S
  tipo: int
modalidade:
  obrigatorio: N
  tipo: str
  enum: [PREGAO, CONCORRENCIA]
id_orgao:
  obrigatorio: S
  tipo: int
  ref: orgaos.id
"#;
        let entry: SchemaEntry = serde_yaml::from_str(yaml).unwrap();
        let keys: Vec<&String> = entry.keys().collect();
        assert_eq!(keys, vec!["id_licitacao", "modalidade", "id_orgao"]);

        assert!(entry["id_licitacao"].required);
        assert_eq!(entry["id_licitacao"].kind, ColumnType::Int);
        assert!(!entry["modalidade"].required);
        assert_eq!(entry["modalidade"].allowed.as_ref().unwrap().len(), 2);
        assert_eq!(
            entry["id_orgao"].reference,
            Some(ForeignKeyRef {
                table: "orgaos".to_string(),
                column: "id".to_string()
            })
        );
    }

    #[test]
    fn test_parse_english_aliases_from_toml() {
        let toml = r#"
[valor]
required = true
type = "float"

[situacao]
required = false
type = "int"
enum = [1, 2, 3]
"#;
        let entry: SchemaEntry = toml::from_str(toml).unwrap();
        assert!(entry["valor"].required);
        assert_eq!(entry["valor"].kind, ColumnType::Float);
        assert_eq!(
            entry["situacao"].allowed,
            Some(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn test_invalid_rules_rejected() {
        assert!(serde_yaml::from_str::<SchemaEntry>("c: {obrigatorio: X, tipo: int}").is_err());
        assert!(serde_yaml::from_str::<SchemaEntry>("c: {obrigatorio: S, tipo: blob}").is_err());
        assert!(serde_yaml::from_str::<SchemaEntry>("c: {tipo: int, ref: nodot}").is_err());
    }
}
