//! Run configuration
//!
//! Handles parsing of `period-ingest.toml` configuration files and
//! environment variable overrides. Query files and the external schema file
//! are read once, at load time, so the rest of the crate only ever sees
//! resolved, typed settings.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::bundle::HttpOptions;
use crate::database::schema::DEFAULT_CONTROL_TABLE;
use crate::schema::{SchemaEntry, SchemaError, SchemaRegistry};
use crate::validation::{validate_identifier, validate_table_name};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = "period-ingest.toml";

/// Default DuckDB file for the control store
pub const DEFAULT_CONTROL_DB: &str = "period-ingest.duckdb";

/// Environment variable for the control database path
pub const ENV_CONTROL_DB: &str = "PERIOD_INGEST_CONTROL_DB";

/// Environment variable for the log level
pub const ENV_LOG_LEVEL: &str = "PERIOD_INGEST_LOG_LEVEL";

/// Environment variable for the HTTP proxy
pub const ENV_HTTP_PROXY: &str = "PERIOD_INGEST_HTTP_PROXY";

/// Placeholder replaced by the period key in file patterns
pub const PERIOD_PLACEHOLDER: &str = "{period}";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Where a source's rows come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// SQL queries against a DuckDB database file
    Duckdb {
        /// Database file; the control database is shared when the paths match
        path: PathBuf,
    },
    /// Delimited files below a directory
    Files { root: PathBuf },
}

/// One table to fetch, validate and load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub name: String,

    /// Key into `[sources]`
    pub source: String,

    /// SQL text; `$1` (or `?`) is bound to the period as `yyyy-mm-dd`
    #[serde(default)]
    pub query: Option<String>,

    /// File holding the SQL text, relative to the config file
    #[serde(default)]
    pub query_file: Option<PathBuf>,

    /// File pattern for `files` sources, e.g. `{period}/licitacoes.csv`
    #[serde(default)]
    pub file: Option<String>,

    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Treat a missing file as an empty batch
    #[serde(default)]
    pub missing_ok: bool,

    /// Destination table; tables without one are fetched for validation
    /// and publishing only
    #[serde(default)]
    pub destination: Option<String>,

    /// Source column to destination column, in destination order
    #[serde(default)]
    pub columns: IndexMap<String, String>,

    #[serde(default)]
    pub validate: bool,

    /// A failed validation of a required table aborts the run
    #[serde(default = "default_true")]
    pub required: bool,

    /// Inline schema; overrides the entry from `schema_file`
    #[serde(default)]
    pub schema: Option<SchemaEntry>,
}

fn default_delimiter() -> char {
    ';'
}

fn default_true() -> bool {
    true
}

impl TableConfig {
    /// File path for `period`, with the placeholder substituted
    pub fn file_for(&self, period_key: &str) -> Option<String> {
        self.file
            .as_ref()
            .map(|pattern| pattern.replace(PERIOD_PLACEHOLDER, period_key))
    }

    /// Declared source columns, in destination order
    pub fn source_columns(&self) -> Vec<String> {
        self.columns.keys().cloned().collect()
    }
}

/// Control store section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlSection {
    /// Disable to run without a control store (publish only)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// DuckDB database file (relative to the config file, or absolute)
    #[serde(default = "default_control_db")]
    pub database: PathBuf,

    #[serde(default = "default_control_table")]
    pub table: String,

    /// Column stamped with the control record id
    #[serde(default = "default_control_id_column")]
    pub control_id_column: String,

    /// Column stamped with the `YYYYMMDD` period
    #[serde(default = "default_period_column")]
    pub period_column: String,
}

fn default_control_db() -> PathBuf {
    PathBuf::from(DEFAULT_CONTROL_DB)
}

fn default_control_table() -> String {
    DEFAULT_CONTROL_TABLE.to_string()
}

fn default_control_id_column() -> String {
    "id_controle_carga".to_string()
}

fn default_period_column() -> String {
    "data_carga".to_string()
}

impl Default for ControlSection {
    fn default() -> Self {
        Self {
            enabled: true,
            database: default_control_db(),
            table: default_control_table(),
            control_id_column: default_control_id_column(),
            period_column: default_period_column(),
        }
    }
}

/// Publish (upload) section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishSection {
    /// Root of the publish destination
    pub destination: PathBuf,

    /// Scratch area where bundles are built
    pub scratch_dir: PathBuf,

    /// Root that local manifest paths are resolved against
    #[serde(default = "default_files_root")]
    pub files_root: PathBuf,

    /// Table whose rows are the published entities
    #[serde(default = "default_main_table")]
    pub main_table: String,

    /// Column identifying an entity in every nested table and the manifest
    #[serde(default = "default_entity_column")]
    pub entity_column: String,

    /// Tables nested into each entity as arrays; empty means every other
    /// fetched table except the manifest
    #[serde(default)]
    pub nested_tables: Vec<String>,

    /// Table listing the files of each entity
    #[serde(default)]
    pub manifest_table: Option<String>,

    /// Manifest column holding the path or URL
    #[serde(default = "default_locator_column")]
    pub locator_column: String,

    #[serde(default = "default_metadata_file")]
    pub metadata_file: String,
}

fn default_files_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_main_table() -> String {
    "licitacoes".to_string()
}

fn default_entity_column() -> String {
    "id_licitacao".to_string()
}

fn default_locator_column() -> String {
    "caminho".to_string()
}

fn default_metadata_file() -> String {
    "licitacoes.json".to_string()
}

/// Period mirror section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSection {
    /// Root holding the remote period directories
    pub source: PathBuf,

    /// Directory below `source` that holds `<period>/`
    #[serde(default)]
    pub source_prefix: String,

    /// Local root receiving `<period>/` and `<period>.ok`
    pub destination: PathBuf,
}

/// Logging section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Also write log lines to this file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Main configuration structure
///
/// Represents the `period-ingest.toml` configuration file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub sources: IndexMap<String, SourceConfig>,

    #[serde(default)]
    pub tables: Vec<TableConfig>,

    /// YAML file with per-table schemas, relative to the config file
    #[serde(default)]
    pub schema_file: Option<PathBuf>,

    #[serde(default)]
    pub control: ControlSection,

    #[serde(default)]
    pub publish: Option<PublishSection>,

    #[serde(default)]
    pub mirror: Option<MirrorSection>,

    #[serde(default)]
    pub http: HttpOptions,

    #[serde(default)]
    pub logging: LoggingSection,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,

    /// Resolved schemas, from `schema_file` plus inline entries
    #[serde(skip)]
    schemas: SchemaRegistry,
}

impl LoaderConfig {
    /// Load, resolve and check a configuration file, then apply
    /// environment overrides
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::parse_in(&content, &base_dir)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string, resolving relative paths
    /// against the current directory
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::parse_in(content, Path::new("."))
    }

    /// Parse configuration from a TOML string, resolving relative paths
    /// against `base_dir`
    pub fn parse_in(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: LoaderConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.base_dir = base_dir.to_path_buf();
        config.resolve()?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Convert configuration to TOML string
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup(ENV_CONTROL_DB) {
            self.control.database = PathBuf::from(path);
        }

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.logging.level = level;
        }

        if let Some(proxy) = lookup(ENV_HTTP_PROXY) {
            self.http.proxy = Some(proxy).filter(|p| !p.is_empty());
        }
    }

    /// Resolve a config-relative path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Control database path, resolved
    pub fn control_db_path(&self) -> PathBuf {
        self.resolve_path(&self.control.database)
    }

    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    pub fn table(&self, name: &str) -> Option<&TableConfig> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Names of the configured tables, in declaration order
    pub fn table_names(&self) -> Vec<String> {
        self.tables.iter().map(|t| t.name.clone()).collect()
    }

    /// Destination tables that hold rows of a period
    pub fn destination_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter_map(|t| t.destination.as_deref())
            .collect()
    }

    /// Read query files and the schema file
    fn resolve(&mut self) -> Result<(), ConfigError> {
        let mut registry = match &self.schema_file {
            Some(file) => SchemaRegistry::load_yaml_file(&self.resolve_path(file))?,
            None => SchemaRegistry::new(),
        };

        let base_dir = self.base_dir.clone();
        for table in &mut self.tables {
            if let Some(file) = &table.query_file {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                let sql = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                table.query = Some(sql);
            }
            if let Some(entry) = &table.schema {
                registry.insert(table.name.clone(), entry.clone());
            }
        }

        self.schemas = registry;
        Ok(())
    }

    /// Cross-field consistency checks
    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let mut names = HashSet::new();

        for table in &self.tables {
            if !names.insert(table.name.as_str()) {
                return invalid(format!("table '{}' is declared twice", table.name));
            }
            let Some(source) = self.sources.get(&table.source) else {
                return invalid(format!(
                    "table '{}' uses unknown source '{}'",
                    table.name, table.source
                ));
            };
            match source {
                SourceConfig::Duckdb { .. } if table.query.is_none() => {
                    return invalid(format!(
                        "table '{}' reads a database source and needs query or query_file",
                        table.name
                    ));
                }
                SourceConfig::Files { .. } if table.file.is_none() => {
                    return invalid(format!(
                        "table '{}' reads a files source and needs a file pattern",
                        table.name
                    ));
                }
                _ => {}
            }
            if table.validate && self.schemas.get(&table.name).is_none() {
                return invalid(format!(
                    "table '{}' requests validation but has no schema",
                    table.name
                ));
            }
            if let Some(destination) = &table.destination {
                validate_table_name(destination)
                    .map_err(|e| ConfigError::Invalid(format!("table '{}': {}", table.name, e)))?;
            }
            for column in table.columns.values() {
                validate_identifier("column", column)
                    .map_err(|e| ConfigError::Invalid(format!("table '{}': {}", table.name, e)))?;
            }
        }

        validate_identifier("control table", &self.control.table)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_identifier("column", &self.control.control_id_column)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        validate_identifier("column", &self.control.period_column)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if let Some(publish) = &self.publish {
            if !names.contains(publish.main_table.as_str()) {
                return invalid(format!(
                    "publish.main_table '{}' is not a configured table",
                    publish.main_table
                ));
            }
            for nested in publish.nested_tables.iter().chain(&publish.manifest_table) {
                if !names.contains(nested.as_str()) {
                    return invalid(format!("publish table '{}' is not configured", nested));
                }
            }
        }

        // Validation order must exist
        self.schemas.validation_order(&self.table_names())?;
        Ok(())
    }
}

/// Generate a sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# period-ingest configuration

# Per-table schemas may also live in a YAML file; inline entries win.
# schema_file = "schemas.yaml"

[sources.metadados]
kind = "duckdb"
path = "origem.duckdb"

[sources.resultados]
kind = "files"
root = "/mnt/resultados"

[[tables]]
name = "licitacoes"
source = "metadados"
query = "SELECT * FROM licitacoes WHERE data_publicacao = CAST($1 AS DATE)"
validate = true
required = true

[tables.schema.id_licitacao]
obrigatorio = "S"
tipo = "int"

[tables.schema.modalidade]
obrigatorio = "N"
tipo = "str"
enum = ["PREGAO", "CONCORRENCIA", "CONVITE"]

[[tables]]
name = "itens"
source = "metadados"
query = "SELECT * FROM itens WHERE data_publicacao = CAST($1 AS DATE)"
validate = true
required = false

[tables.schema.id_licitacao]
obrigatorio = "S"
tipo = "int"
ref = "licitacoes.id_licitacao"

[tables.schema.descricao]
obrigatorio = "N"
tipo = "str"

[[tables]]
name = "arquivos"
source = "metadados"
query = "SELECT id_licitacao, caminho FROM arquivos WHERE data_publicacao = CAST($1 AS DATE)"

[[tables]]
name = "resultado"
source = "resultados"
file = "resultados/{period}/licitacoes.csv"
delimiter = ";"
missing_ok = true
destination = "resultado_analise"

[tables.columns]
ID_LICITACAO = "id_licitacao"
RISCO = "risco"

[control]
database = "period-ingest.duckdb"
table = "controle_carga"
control_id_column = "id_controle_carga"
period_column = "data_carga"

[publish]
destination = "/mnt/envio"
scratch_dir = "/tmp/period-ingest"
main_table = "licitacoes"
entity_column = "id_licitacao"
nested_tables = ["itens"]
manifest_table = "arquivos"
locator_column = "caminho"
metadata_file = "licitacoes.json"

[mirror]
source = "/mnt/resultados"
source_prefix = "resultados"
destination = "/srv/resultados"

[http]
timeout_secs = 120
# proxy = "http://proxy.example:3128"

[logging]
level = "info"
# file = "period-ingest.log"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MINIMAL: &str = r#"
[sources.db]
kind = "duckdb"
path = "origem.duckdb"

[[tables]]
name = "licitacoes"
source = "db"
query = "SELECT 1"
"#;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::parse(MINIMAL).unwrap();
        assert!(config.control.enabled);
        assert_eq!(config.control.table, DEFAULT_CONTROL_TABLE);
        assert_eq!(config.control.period_column, "data_carga");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.tables[0].delimiter, ';');
        assert!(config.tables[0].required);
        assert!(config.publish.is_none());
    }

    #[test]
    fn test_sample_config_parses() {
        let config = LoaderConfig::parse(sample_config()).unwrap();

        assert_eq!(config.tables.len(), 4);
        assert_eq!(config.schemas().len(), 2);
        assert_eq!(
            config.table("resultado").unwrap().file_for("20240105"),
            Some("resultados/20240105/licitacoes.csv".to_string())
        );
        assert_eq!(
            config.table("resultado").unwrap().source_columns(),
            vec!["ID_LICITACAO", "RISCO"]
        );
        assert_eq!(config.destination_tables(), vec!["resultado_analise"]);
        let publish = config.publish.as_ref().unwrap();
        assert_eq!(publish.manifest_table.as_deref(), Some("arquivos"));
    }

    #[test]
    fn test_schema_file_merges_with_inline_schemas() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("schemas.yaml"),
            "arquivos:\n  id_licitacao: {obrigatorio: S, tipo: int}\nlicitacoes:\n  x: {tipo: str}\n",
        )
        .unwrap();
        let toml = format!("schema_file = \"schemas.yaml\"\n{}", sample_config());
        let config = LoaderConfig::parse_in(&toml, dir.path()).unwrap();

        assert_eq!(config.schemas().len(), 3);
        assert!(config.schemas().get("arquivos").is_some());
        assert!(config.schemas().get("licitacoes").unwrap().contains_key("id_licitacao"));
    }

    #[test]
    fn test_query_file_is_read_relative_to_config() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("itens.sql"), "SELECT * FROM itens").unwrap();
        let toml = r#"
[sources.db]
kind = "duckdb"
path = "origem.duckdb"

[[tables]]
name = "itens"
source = "db"
query_file = "itens.sql"
"#;
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, toml).unwrap();

        let config = LoaderConfig::load(&path).unwrap();
        assert_eq!(
            config.tables[0].query.as_deref(),
            Some("SELECT * FROM itens")
        );
    }

    #[test]
    fn test_unknown_source_rejected() {
        let toml = r#"
[[tables]]
name = "t"
source = "ghost"
query = "SELECT 1"
"#;
        assert!(matches!(
            LoaderConfig::parse(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_validation_without_schema_rejected() {
        let toml = format!("{}validate = true\n", MINIMAL);
        assert!(matches!(
            LoaderConfig::parse(&toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_reference_cycle_rejected() {
        let toml = r#"
[sources.db]
kind = "duckdb"
path = "x.duckdb"

[[tables]]
name = "a"
source = "db"
query = "SELECT 1"
[tables.schema.b_id]
tipo = "int"
ref = "b.id"

[[tables]]
name = "b"
source = "db"
query = "SELECT 1"
[tables.schema.a_id]
tipo = "int"
ref = "a.id"
"#;
        assert!(matches!(
            LoaderConfig::parse(toml),
            Err(ConfigError::Schema(SchemaError::ReferenceCycle(_)))
        ));
    }

    #[test]
    fn test_overrides() {
        let mut config = LoaderConfig::parse(MINIMAL).unwrap();
        config.apply_overrides_from(|key| match key {
            ENV_CONTROL_DB => Some("/var/lib/ingest.duckdb".to_string()),
            ENV_LOG_LEVEL => Some("debug".to_string()),
            ENV_HTTP_PROXY => Some("http://proxy:3128".to_string()),
            _ => None,
        });
        assert_eq!(
            config.control_db_path(),
            PathBuf::from("/var/lib/ingest.duckdb")
        );
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.http.proxy.as_deref(), Some("http://proxy:3128"));
    }

    #[test]
    fn test_to_toml_roundtrip() {
        let config = LoaderConfig::parse(MINIMAL).unwrap();
        let toml = config.to_toml().unwrap();
        let reparsed = LoaderConfig::parse(&toml).unwrap();
        assert_eq!(reparsed.tables, config.tables);
        assert_eq!(reparsed.control, config.control);
    }
}
