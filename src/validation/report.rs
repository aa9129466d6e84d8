//! Validation findings

use serde::{Deserialize, Serialize};
use std::fmt;

/// What a finding is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingRequiredColumns,
    UnexpectedColumn,
    NullInRequiredColumn,
    AllNullColumn,
    TypeMismatch,
    IntDeclaredFloat,
    FloatDeclaredInt,
    EnumViolation,
    ReferenceViolation,
    ReferencedTableUnavailable,
}

/// One diagnostic or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub kind: IssueKind,
    /// Column the finding is about, absent for table-level findings
    pub column: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(kind: IssueKind, column: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            kind,
            column: column.map(str::to_string),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Outcome of validating one table batch.
///
/// Diagnostics block persistence; warnings are logged only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[must_use = "a validation report must be checked before persisting rows"]
pub struct ValidationReport {
    pub table: String,
    pub diagnostics: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn error(&mut self, kind: IssueKind, column: Option<&str>, message: impl Into<String>) {
        self.diagnostics
            .push(ValidationIssue::new(kind, column, message));
    }

    pub fn warn(&mut self, kind: IssueKind, column: Option<&str>, message: impl Into<String>) {
        self.warnings.push(ValidationIssue::new(kind, column, message));
    }

    pub fn has_diagnostic(&self, kind: IssueKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn has_warning(&self, kind: IssueKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// Diagnostic messages, in the order they were found
    pub fn diagnostic_messages(&self) -> Vec<String> {
        self.diagnostics.iter().map(|d| d.message.clone()).collect()
    }
}
