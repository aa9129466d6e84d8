//! Schema validation engine
//!
//! Checks one table batch against its [`SchemaEntry`]: required columns,
//! unexpected columns, nulls, inferred versus declared types, enumerations
//! and `ref` lookups against tables already accepted in the
//! [`ValidationContext`]. Every finding is collected; nothing short-circuits
//! except a missing required column, which makes per-column checks moot.

use std::collections::HashSet;
use tracing::{debug, info};

use super::context::ValidationContext;
use super::report::{IssueKind, ValidationReport};
use crate::models::{InferredType, RowSet, Value};
use crate::schema::{ColumnRule, ColumnType, ForeignKeyRef, SchemaEntry};

/// Stateless validator; all run state lives in the context argument
#[derive(Debug, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    /// Create a new validation engine
    pub fn new() -> Self {
        Self
    }

    /// Validate `rows` of `table` against `entry`.
    ///
    /// An empty diagnostics list means the batch is accepted.
    pub fn validate(
        &self,
        table: &str,
        rows: &RowSet,
        entry: &SchemaEntry,
        context: &ValidationContext,
    ) -> ValidationReport {
        info!("Validating {} rows of table \"{}\"", rows.len(), table);
        let mut report = ValidationReport::new(table);

        let missing: Vec<&str> = entry
            .iter()
            .filter(|(name, rule)| rule.required && !rows.has_column(name))
            .map(|(name, _)| name.as_str())
            .collect();
        if !missing.is_empty() {
            report.error(
                IssueKind::MissingRequiredColumns,
                None,
                format!(
                    "Required column(s) \"{}\" are missing from table \"{}\"",
                    missing.join(","),
                    table
                ),
            );
            return report;
        }

        for column in rows.columns() {
            debug!("Validating column {}.{}", table, column);
            let Some(rule) = entry.get(column) else {
                report.error(
                    IssueKind::UnexpectedColumn,
                    Some(column),
                    format!(
                        "Column \"{}\" is returned for table \"{}\" but is not part of its schema",
                        column, table
                    ),
                );
                continue;
            };
            let cells: Vec<&Value> = rows.column_values(column).into_iter().flatten().collect();

            Self::check_nulls_and_type(&mut report, table, column, rule, &cells);

            if let Some(allowed) = &rule.allowed {
                Self::check_enum(&mut report, column, rule.required, allowed, &cells);
            }

            if let Some(reference) = &rule.reference {
                Self::check_reference(&mut report, table, column, reference, rows, context, &cells);
            }
        }

        report
    }

    fn check_nulls_and_type(
        report: &mut ValidationReport,
        table: &str,
        column: &str,
        rule: &ColumnRule,
        cells: &[&Value],
    ) {
        if rule.required && cells.iter().any(|v| v.is_null()) {
            report.error(
                IssueKind::NullInRequiredColumn,
                Some(column),
                format!(
                    "Column \"{}\" of table \"{}\" is required but one or more rows are null",
                    column, table
                ),
            );
            return;
        }

        let Some(inferred) = InferredType::of_column(cells.iter().copied()) else {
            report.warn(
                IssueKind::AllNullColumn,
                Some(column),
                format!(
                    "Type of column \"{}\" cannot be inferred because it only holds nulls",
                    column
                ),
            );
            return;
        };

        match (inferred, rule.kind) {
            (found, declared) if declared.matches(found) => {}
            (InferredType::Int, ColumnType::Float) => report.warn(
                IssueKind::IntDeclaredFloat,
                Some(column),
                format!(
                    "Column \"{}\" holds int values but is declared float; loading anyway",
                    column
                ),
            ),
            (InferredType::Float, ColumnType::Int) => report.warn(
                IssueKind::FloatDeclaredInt,
                Some(column),
                format!(
                    "Column \"{}\" holds float values but is declared int; values may be truncated",
                    column
                ),
            ),
            (found, declared) => report.error(
                IssueKind::TypeMismatch,
                Some(column),
                format!(
                    "Column \"{}\" is of type {} but should be of type {}",
                    column, found, declared
                ),
            ),
        }
    }

    fn check_enum(
        report: &mut ValidationReport,
        column: &str,
        required: bool,
        allowed: &[Value],
        cells: &[&Value],
    ) {
        let permitted: HashSet<String> = allowed.iter().filter_map(Value::lookup_key).collect();
        let null_permitted = !required || allowed.iter().any(Value::is_null);
        let violations = cells
            .iter()
            .filter(|v| match v.lookup_key() {
                Some(key) => !permitted.contains(&key),
                None => !null_permitted,
            })
            .count();
        if violations > 0 {
            report.error(
                IssueKind::EnumViolation,
                Some(column),
                format!(
                    "{} row(s) of column \"{}\" are outside the allowed values",
                    violations, column
                ),
            );
        }
    }

    fn check_reference(
        report: &mut ValidationReport,
        table: &str,
        column: &str,
        reference: &ForeignKeyRef,
        rows: &RowSet,
        context: &ValidationContext,
        cells: &[&Value],
    ) {
        let target = if reference.table == table {
            Some(rows)
        } else {
            context.get(&reference.table)
        };
        let Some(target) = target else {
            report.error(
                IssueKind::ReferencedTableUnavailable,
                Some(column),
                format!(
                    "Column \"{}\" references {} but table \"{}\" has not been validated in this run",
                    column, reference, reference.table
                ),
            );
            return;
        };
        // An empty batch may carry no columns at all
        if !target.is_empty() && !target.has_column(&reference.column) {
            report.error(
                IssueKind::ReferencedTableUnavailable,
                Some(column),
                format!(
                    "Column \"{}\" references {} but that column does not exist",
                    column, reference
                ),
            );
            return;
        }

        let valid = target.distinct_keys(&reference.column);
        let violations = cells
            .iter()
            .filter_map(|v| v.lookup_key())
            .filter(|key| !valid.contains(key))
            .count();
        if violations > 0 {
            report.error(
                IssueKind::ReferenceViolation,
                Some(column),
                format!(
                    "{} row(s) of column \"{}\" have no matching {}",
                    violations, column, reference
                ),
            );
        }
    }
}
