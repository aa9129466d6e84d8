//! period-ingest - Idempotent daily batch loader
//!
//! Provides:
//! - A resumable per-period load controller backed by a control table
//! - Declarative schema validation (required columns, types, enums, references)
//! - Row sources over DuckDB queries and delimited files
//! - Per-entity file bundles, metadata export and period mirrors over storage backends

pub mod bundle;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod export;
pub mod models;
pub mod orchestrator;
pub mod period;
pub mod schema;
pub mod source;
pub mod storage;
pub mod validation;

// Re-export commonly used types
pub use storage::filesystem::FileSystemStorageBackend;
pub use storage::{StorageBackend, StorageError};

pub use bundle::{BundleError, BundleInfo, FetchError, FileBundler, RemoteFetcher};
pub use config::{ConfigError, LoaderConfig, TableConfig};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDbStore;
pub use database::{ControlStore, ControlTransaction, DatabaseError, MemoryStore};
pub use error::{LoadError, LoadResult};
pub use export::{ExportError, ExportResult, MetadataExporter};
pub use orchestrator::{
    DayBatch, LoadOrchestrator, MirrorOutcome, PeriodStart, PublishOutcome, RunStats,
};
pub use period::{Period, PeriodError, PeriodRange};
pub use schema::{ColumnRule, ColumnType, SchemaEntry, SchemaError, SchemaRegistry};
pub use source::{ConfiguredSource, RowSource, SourceError};
pub use validation::{ValidationContext, ValidationEngine, ValidationReport};

// Re-export models
pub use models::{ControlRecord, FileManifestEntry, Locator, RowSet, Value};
