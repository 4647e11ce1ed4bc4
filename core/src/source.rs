//! Source database dialect adapter
//!
//! Sources are reached through DuckDB `ATTACH` with the matching scanner
//! extension, so table discovery and row extraction go through one engine
//! regardless of dialect.

use crate::error::{Result, TablesnapError};
use crate::model::{Datasource, SourceDialect};
use crate::sql::quote_ident;
use duckdb::Connection;

/// Alias the source database is attached under
const SOURCE_ALIAS: &str = "src";

/// A live connection to a source database
pub trait SourceConnection {
    /// Engine connection with the source attached
    fn connection(&self) -> &Connection;

    /// Base tables in one schema
    fn list_tables(&self, schema: &str) -> Result<Vec<String>>;

    /// Primary key column names, in ordinal position. Best-effort: failures
    /// degrade to an empty list, they never fail a capture.
    fn primary_keys(&self, schema: &str, table: &str) -> Vec<String>;

    /// Query selecting every row of one table
    fn table_query(&self, schema: &str, table: &str) -> String;
}

pub struct AttachedSource {
    connection: Connection,
    dialect: SourceDialect,
}

impl AttachedSource {
    /// Open a fresh engine session and attach the source database
    pub fn connect(datasource: &Datasource) -> Result<Self> {
        let connection_string = build_connection_string(datasource)?;
        let connection = Connection::open_in_memory()?;

        let attach_type = match datasource.dialect {
            SourceDialect::Mysql => "mysql",
            SourceDialect::Postgresql => "postgres",
            SourceDialect::Sqlite => "sqlite",
        };

        connection
            .execute(
                &format!("ATTACH '{connection_string}' AS {SOURCE_ALIAS} (TYPE {attach_type})"),
                [],
            )
            .map_err(|e| {
                TablesnapError::connection_failed(format!(
                    "failed to attach {} datasource '{}': {e}",
                    datasource.dialect, datasource.name
                ))
            })?;

        Ok(Self {
            connection,
            dialect: datasource.dialect,
        })
    }
}

impl SourceConnection for AttachedSource {
    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn list_tables(&self, schema: &str) -> Result<Vec<String>> {
        let mut stmt = self.connection.prepare(
            "SELECT table_name FROM duckdb_tables() \
             WHERE database_name = ? AND schema_name = ? ORDER BY table_name",
        )?;
        let rows = stmt.query_map([SOURCE_ALIAS, schema], |row| row.get::<_, String>(0))?;

        let mut tables = Vec::new();
        for row in rows {
            tables.push(row?);
        }
        Ok(tables)
    }

    fn primary_keys(&self, schema: &str, table: &str) -> Vec<String> {
        match self.discover_primary_keys(schema, table) {
            Ok(keys) => keys,
            Err(e) => {
                log::warn!("primary key discovery failed for {schema}.{table}: {e}");
                Vec::new()
            }
        }
    }

    fn table_query(&self, schema: &str, table: &str) -> String {
        format!(
            "SELECT * FROM {SOURCE_ALIAS}.{}.{}",
            quote_ident(schema),
            quote_ident(table)
        )
    }
}

impl AttachedSource {
    fn discover_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        // duckdb_constraints() surfaces key metadata for attached catalogs
        // that expose it; scanners that don't simply return no rows.
        let mut stmt = self.connection.prepare(
            "SELECT unnest(constraint_column_names) FROM duckdb_constraints() \
             WHERE database_name = ? AND schema_name = ? AND table_name = ? \
               AND constraint_type = 'PRIMARY KEY'",
        )?;
        let rows = stmt.query_map([SOURCE_ALIAS, schema, table], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }

        if keys.is_empty() && self.dialect == SourceDialect::Mysql {
            keys = self.mysql_primary_keys(schema, table)?;
        }
        Ok(keys)
    }

    fn mysql_primary_keys(&self, schema: &str, table: &str) -> Result<Vec<String>> {
        let mut stmt = self.connection.prepare(&format!(
            "SELECT column_name FROM {SOURCE_ALIAS}.information_schema.key_column_usage \
             WHERE table_schema = ? AND table_name = ? AND constraint_name = 'PRIMARY' \
             ORDER BY ordinal_position"
        ))?;
        let rows = stmt.query_map([schema, table], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

/// Build the dialect connection string, resolving the password from the
/// environment variable the datasource names.
pub fn build_connection_string(datasource: &Datasource) -> Result<String> {
    if let Some(direct) = &datasource.connection_string {
        return Ok(direct.clone());
    }

    let password = match &datasource.password_env {
        Some(var) => std::env::var(var).map_err(|_| {
            TablesnapError::config(format!(
                "password environment variable '{var}' is not set for datasource '{}'",
                datasource.name
            ))
        })?,
        None => String::new(),
    };

    match datasource.dialect {
        SourceDialect::Sqlite => datasource
            .database
            .clone()
            .ok_or_else(|| {
                TablesnapError::config(format!(
                    "sqlite datasource '{}' has no database path",
                    datasource.name
                ))
            }),
        SourceDialect::Mysql | SourceDialect::Postgresql => {
            let scheme = match datasource.dialect {
                SourceDialect::Mysql => "mysql",
                _ => "postgresql",
            };
            let host = datasource.host.as_deref().unwrap_or("localhost");
            let port = datasource.port.unwrap_or(match datasource.dialect {
                SourceDialect::Mysql => 3306,
                _ => 5432,
            });
            let database = datasource.database.as_deref().ok_or_else(|| {
                TablesnapError::config(format!(
                    "datasource '{}' has no database name",
                    datasource.name
                ))
            })?;
            let username = datasource.username.as_deref().unwrap_or("");

            Ok(format!(
                "{scheme}://{username}:{password}@{host}:{port}/{database}"
            ))
        }
    }
}

/// Apply a datasource's include/exclude patterns to a table list
pub fn filter_tables(datasource: &Datasource, tables: Vec<String>) -> Vec<String> {
    tables
        .into_iter()
        .filter(|table| {
            let included = datasource.tables.is_empty()
                || datasource
                    .tables
                    .iter()
                    .any(|pattern| matches_pattern(table, pattern));
            let excluded = datasource
                .exclude_tables
                .iter()
                .any(|pattern| matches_pattern(table, pattern));
            included && !excluded
        })
        .collect()
}

/// Simple wildcard matching for table names (`*` prefix or suffix)
fn matches_pattern(table: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        table.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        table.ends_with(suffix)
    } else {
        table == pattern
    }
}
