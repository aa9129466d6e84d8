//! Identifier validation for destination tables and columns
//!
//! Table and column names come from configuration and end up inside SQL
//! statements. They are checked here and always emitted quoted.

use thiserror::Error;

/// Maximum length of a single identifier part
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Errors that can occur during identifier validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Identifier is empty
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    /// Identifier exceeds the maximum length
    #[error("{field} exceeds maximum length (max: {max}, got: {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// Identifier contains characters outside letters, digits and underscores
    #[error("{field} '{name}' contains invalid character '{found}'")]
    InvalidCharacter {
        field: &'static str,
        name: String,
        found: char,
    },

    /// Identifier starts with a digit
    #[error("{field} '{name}' must start with a letter or underscore")]
    InvalidStart { field: &'static str, name: String },
}

impl IdentifierError {
    fn invalid_start(field: &'static str, name: &str) -> Self {
        IdentifierError::InvalidStart {
            field,
            name: name.to_string(),
        }
    }
}

/// Validate a plain identifier (column name, or one part of a table name)
///
/// # Examples
///
/// ```
/// use period_ingest::validation::identifier::validate_identifier;
///
/// assert!(validate_identifier("column", "id_licitacao").is_ok());
/// assert!(validate_identifier("column", "1st").is_err());
/// ```
pub fn validate_identifier(field: &'static str, name: &str) -> Result<(), IdentifierError> {
    let Some(first) = name.chars().next() else {
        return Err(IdentifierError::Empty(field));
    };
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(IdentifierError::TooLong {
            field,
            max: MAX_IDENTIFIER_LENGTH,
            actual: name.len(),
        });
    }
    if !first.is_alphabetic() && first != '_' {
        return Err(IdentifierError::invalid_start(field, name));
    }
    if let Some(found) = name.chars().find(|c| !c.is_alphanumeric() && *c != '_') {
        return Err(IdentifierError::InvalidCharacter {
            field,
            name: name.to_string(),
            found,
        });
    }
    Ok(())
}

/// Validate a table name, optionally schema-qualified (`schema.table`)
pub fn validate_table_name(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty("table name"));
    }
    name.split('.')
        .try_for_each(|part| validate_identifier("table name", part))
}

/// Quote an identifier for SQL, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote each part of a possibly schema-qualified table name
pub fn quote_table_name(name: &str) -> String {
    name.split('.')
        .map(quote_identifier)
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("column", "valor_total").is_ok());
        assert!(validate_identifier("column", "_interno").is_ok());
        assert_eq!(
            validate_identifier("column", ""),
            Err(IdentifierError::Empty("column"))
        );
        assert!(matches!(
            validate_identifier("column", "a;drop"),
            Err(IdentifierError::InvalidCharacter { found: ';', .. })
        ));
        assert!(validate_identifier("column", &"x".repeat(300)).is_err());
    }

    #[test]
    fn test_qualified_table_names() {
        assert!(validate_table_name("main.licitacoes").is_ok());
        assert!(validate_table_name("main.").is_err());
        assert_eq!(quote_table_name("main.licitacoes"), "\"main\".\"licitacoes\"");
    }

    #[test]
    fn test_quote_doubles_quotes() {
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
