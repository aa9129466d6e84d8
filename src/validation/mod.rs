//! Validation functionality
//!
//! Provides:
//! - Schema validation of table batches (required columns, types, enums, references)
//! - The per-run context used for cross-table reference checks
//! - Identifier validation for destination tables and columns

pub mod context;
pub mod engine;
pub mod identifier;
pub mod report;

pub use context::ValidationContext;
pub use engine::ValidationEngine;
pub use identifier::{
    IdentifierError, quote_identifier, quote_table_name, validate_identifier, validate_table_name,
};
pub use report::{IssueKind, ValidationIssue, ValidationReport};
