//! Validated Postgres schema identifiers.
//!
//! Every store and repository is schema-qualified: one process indexes one
//! `(schema, chain)` pair, and table names are built with
//! `format!("{schema}.table")` rather than bind parameters (Postgres doesn't
//! allow identifiers to be bound). `SchemaName` is the single place that
//! string is validated so an unvalidated value can never reach a query.

use crate::error::AppError;

const MAX_IDENTIFIER_LEN: usize = 63;

/// A Postgres schema identifier, validated at construction time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SchemaName(String);

impl SchemaName {
    /// Validate and wrap a schema name.
    ///
    /// Rules: `^[a-zA-Z_][a-zA-Z0-9_$]*$`, length ≤ 63.
    pub fn parse(raw: impl Into<String>) -> Result<Self, AppError> {
        let raw = raw.into();

        if raw.is_empty() || raw.len() > MAX_IDENTIFIER_LEN {
            return Err(AppError::Config(format!(
                "schema identifier '{raw}' must be 1-{MAX_IDENTIFIER_LEN} characters"
            )));
        }

        let mut chars = raw.chars();
        let first = chars.next().expect("non-empty checked above");
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(AppError::Config(format!(
                "schema identifier '{raw}' must start with a letter or underscore"
            )));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
            return Err(AppError::Config(format!(
                "schema identifier '{raw}' contains characters outside [a-zA-Z0-9_$]"
            )));
        }

        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build a schema-qualified, double-quoted table reference.
    ///
    /// Quoting the already-validated identifier keeps it safe even though it
    /// was never attacker-controlled by construction.
    pub fn table(&self, name: &str) -> String {
        format!("\"{}\".\"{}\"", self.0, name)
    }
}

impl std::fmt::Display for SchemaName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_valid_identifiers() {
        assert!(SchemaName::parse("flare_mainnet").is_ok());
        assert!(SchemaName::parse("_private").is_ok());
        assert!(SchemaName::parse("a").is_ok());
    }

    #[test]
    fn rejects_leading_digit() {
        assert!(SchemaName::parse("1flare").is_err());
    }

    #[test]
    fn rejects_quote_injection() {
        assert!(SchemaName::parse("public\"; drop table x; --").is_err());
    }

    #[test]
    fn rejects_over_length() {
        let long = "a".repeat(64);
        assert!(SchemaName::parse(long).is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(SchemaName::parse("").is_err());
    }

    #[test]
    fn table_is_quoted() {
        let schema = SchemaName::parse("flare").unwrap();
        assert_eq!(schema.table("_cursor"), "\"flare\".\"_cursor\"");
    }
}
