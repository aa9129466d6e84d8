//! Export functionality
//!
//! Provides the JSON metadata export written next to the published bundles.

pub mod metadata;

/// Result of an export operation.
///
/// Contains the exported content and format identifier.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[must_use = "export results contain the exported content and should be used"]
pub struct ExportResult {
    /// Exported content
    pub content: String,
    /// Format identifier
    pub format: String,
    /// Number of top-level records
    pub records: usize,
}

/// Error during export
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Entity column '{column}' not found in table '{table}'")]
    MissingEntityColumn { table: String, column: String },
}

pub use metadata::MetadataExporter;
