//! SQL validation and per-request namespace generation

pub mod guard;
pub mod namespace;

/// Quote an identifier for interpolation into engine SQL
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for interpolation into engine SQL
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
