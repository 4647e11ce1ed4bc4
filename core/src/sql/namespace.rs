//! Per-request query namespace generation
//!
//! A query request names one or more snapshots, each under a caller-chosen
//! alias. The generator turns `(validated aliases, resolved file URIs)` into
//! an ordered list of DDL strings: one schema per alias, one view per table,
//! and unqualified root views when exactly one snapshot is in context. It is
//! a pure function with no engine dependency.

use super::{guard, quote_ident, quote_literal};
use crate::error::Result;

/// One snapshot exposed under an alias
#[derive(Debug, Clone)]
pub struct AliasedSnapshot {
    pub alias: String,
    /// `(table name, resolved file URI)` pairs
    pub tables: Vec<(String, String)>,
}

/// Generate the setup statements creating the temporary namespace
pub fn build_setup_statements(snapshots: &[AliasedSnapshot]) -> Result<Vec<String>> {
    guard::validate_aliases(snapshots.iter().map(|s| s.alias.as_str()))?;

    let mut statements = Vec::new();
    let single_snapshot = snapshots.len() == 1;

    for snapshot in snapshots {
        statements.push(format!(
            "CREATE SCHEMA {}",
            quote_ident(&snapshot.alias)
        ));

        for (table, uri) in &snapshot.tables {
            guard::validate_uri(uri)?;
            statements.push(format!(
                "CREATE VIEW {}.{} AS SELECT * FROM read_parquet({})",
                quote_ident(&snapshot.alias),
                quote_ident(table),
                quote_literal(uri)
            ));
        }
    }

    // With a single snapshot in context, expose root-level views so
    // `SELECT * FROM orders` works without the alias prefix.
    if single_snapshot {
        for (table, uri) in &snapshots[0].tables {
            statements.push(format!(
                "CREATE VIEW {} AS SELECT * FROM read_parquet({})",
                quote_ident(table),
                quote_literal(uri)
            ));
        }
    }

    Ok(statements)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(alias: &str, tables: &[(&str, &str)]) -> AliasedSnapshot {
        AliasedSnapshot {
            alias: alias.to_string(),
            tables: tables
                .iter()
                .map(|(t, u)| (t.to_string(), u.to_string()))
                .collect(),
        }
    }

    #[test]
    fn single_snapshot_gets_root_views() {
        let statements = build_setup_statements(&[snapshot(
            "s1",
            &[("orders", "/data/a.parquet"), ("users", "/data/b.parquet")],
        )])
        .unwrap();

        assert_eq!(
            statements,
            vec![
                "CREATE SCHEMA \"s1\"".to_string(),
                "CREATE VIEW \"s1\".\"orders\" AS SELECT * FROM read_parquet('/data/a.parquet')"
                    .to_string(),
                "CREATE VIEW \"s1\".\"users\" AS SELECT * FROM read_parquet('/data/b.parquet')"
                    .to_string(),
                "CREATE VIEW \"orders\" AS SELECT * FROM read_parquet('/data/a.parquet')"
                    .to_string(),
                "CREATE VIEW \"users\" AS SELECT * FROM read_parquet('/data/b.parquet')"
                    .to_string(),
            ]
        );
    }

    #[test]
    fn multiple_snapshots_are_alias_qualified_only() {
        let statements = build_setup_statements(&[
            snapshot("current", &[("orders", "/data/new.parquet")]),
            snapshot("prev_2024", &[("orders", "/data/old.parquet")]),
        ])
        .unwrap();

        assert_eq!(statements.len(), 4);
        assert!(statements
            .iter()
            .all(|s| s.contains("\"current\"") || s.contains("\"prev_2024\"")));
    }

    #[test]
    fn invalid_alias_rejected() {
        let err =
            build_setup_statements(&[snapshot("Invalid-Alias!", &[("t", "/x.parquet")])])
                .unwrap_err();
        assert!(err.to_string().contains("invalid alias"));
    }

    #[test]
    fn duplicate_alias_rejected() {
        let err = build_setup_statements(&[
            snapshot("s1", &[("a", "/a.parquet")]),
            snapshot("s1", &[("b", "/b.parquet")]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn quoted_uri_rejected() {
        let err = build_setup_statements(&[snapshot(
            "s1",
            &[("t", "/tmp/x') union select * from secrets --.parquet")],
        )])
        .unwrap_err();
        assert!(err.to_string().contains("illegal characters"));
    }
}
