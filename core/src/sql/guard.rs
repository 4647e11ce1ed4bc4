//! Deny-list SQL sandboxing
//!
//! String matching on keywords, not a parser. This layer is deliberately
//! conservative advisory defense-in-depth for SQL that reaches the embedded
//! engine; it is not a hard security boundary against an adversarial author
//! with engine-specific knowledge.

use crate::error::{Result, TablesnapError};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Keywords that mutate state, matched case-insensitively as a substring
/// with a trailing space.
const MUTATING_KEYWORDS: [&str; 10] = [
    "insert", "update", "delete", "drop", "create", "alter", "truncate", "grant", "revoke",
    "execute",
];

/// Alias names that would shadow engine namespaces
const RESERVED_ALIASES: [&str; 4] = ["main", "information_schema", "temp", "pg_catalog"];

fn alias_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("valid alias pattern"))
}

fn order_term_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\s+(?i:asc|desc))?$").expect("valid order pattern")
    })
}

/// Validate that a statement is a single read-only query
pub fn validate_read_only(sql: &str) -> Result<()> {
    let trimmed = sql.trim();
    if trimmed.is_empty() {
        return Err(TablesnapError::query_rejected("empty statement"));
    }

    if trimmed.contains(';') {
        return Err(TablesnapError::query_rejected(
            "multiple statements are not allowed (found ';')",
        ));
    }

    let lower = trimmed.to_lowercase();
    for keyword in MUTATING_KEYWORDS {
        if lower.contains(&format!("{keyword} ")) {
            return Err(TablesnapError::query_rejected(format!(
                "forbidden keyword '{}'",
                keyword.to_uppercase()
            )));
        }
    }

    if !(lower.starts_with("select") || lower.starts_with("with")) {
        return Err(TablesnapError::query_rejected(
            "only SELECT or WITH queries are allowed",
        ));
    }

    Ok(())
}

/// Validate a single snapshot alias
pub fn validate_alias(alias: &str) -> Result<()> {
    if !alias_pattern().is_match(alias) {
        return Err(TablesnapError::query_rejected(format!(
            "invalid alias '{alias}': must match ^[a-z][a-z0-9_]{{0,62}}$"
        )));
    }
    if RESERVED_ALIASES.contains(&alias) {
        return Err(TablesnapError::query_rejected(format!(
            "alias '{alias}' is a reserved name"
        )));
    }
    Ok(())
}

/// Validate a set of aliases for one request, rejecting duplicates
pub fn validate_aliases<'a, I: IntoIterator<Item = &'a str>>(aliases: I) -> Result<()> {
    let mut seen = HashSet::new();
    for alias in aliases {
        validate_alias(alias)?;
        if !seen.insert(alias) {
            return Err(TablesnapError::query_rejected(format!(
                "duplicate alias '{alias}'"
            )));
        }
    }
    Ok(())
}

/// File URIs destined for interpolation must not carry quote characters
pub fn validate_uri(uri: &str) -> Result<()> {
    if uri.contains('\'') || uri.contains('"') {
        return Err(TablesnapError::query_rejected(format!(
            "illegal characters in file location '{uri}'"
        )));
    }
    Ok(())
}

/// Validate an ORDER BY clause: comma-separated terms, each a single
/// identifier with an optional ASC/DESC direction. Blocks subqueries and
/// expression injection through the sort parameter.
pub fn validate_order_by(clause: &str) -> Result<()> {
    let trimmed = clause.trim();
    if trimmed.is_empty() {
        return Err(TablesnapError::query_rejected("empty ORDER BY clause"));
    }
    for term in trimmed.split(',') {
        let term = term.trim();
        if !order_term_pattern().is_match(term) {
            return Err(TablesnapError::query_rejected(format!(
                "invalid ORDER BY term '{term}': expected <identifier> [ASC|DESC]"
            )));
        }
    }
    Ok(())
}

/// Validate a raw boolean filter expression by wrapping it in a throwaway
/// single-statement query and running it through the same validator.
pub fn validate_where(expr: &str) -> Result<()> {
    validate_read_only(&format!("SELECT 1 WHERE {expr}"))
}
