//! Common test utilities and fixtures
#![allow(dead_code)]

use duckdb::Connection;
use std::path::PathBuf;
use std::sync::Arc;
use tablesnap_core::error::Result;
use tablesnap_core::model::{Datasource, RetentionPolicy, SourceDialect};
use tablesnap_core::source::SourceConnection;
use tablesnap_core::storage::{LocalStorage, StorageBackend};
use tempfile::TempDir;

/// A local storage backend rooted in a temp directory
pub struct TestStore {
    pub temp: TempDir,
    pub backend: Arc<dyn StorageBackend>,
}

impl TestStore {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("failed to create temp dir");
        let backend: Arc<dyn StorageBackend> =
            Arc::new(LocalStorage::new(temp.path().join("storage")));
        Self { temp, backend }
    }

    pub fn write(&self, path: &str, data: &[u8]) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(self.backend.write(path, data)).unwrap();
    }

    pub fn exists(&self, path: &str) -> bool {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(self.backend.exists(path)).unwrap()
    }
}

pub fn sample_datasource(id: &str, name: &str, retention: RetentionPolicy) -> Datasource {
    Datasource {
        id: id.to_string(),
        name: name.to_string(),
        dialect: SourceDialect::Sqlite,
        host: None,
        port: None,
        database: Some("app.db".to_string()),
        username: None,
        password_env: None,
        connection_string: None,
        schemas: vec!["main".to_string()],
        tables: Vec::new(),
        exclude_tables: Vec::new(),
        schedule: None,
        retention,
        memo: None,
    }
}

/// Source connection backed by an in-memory engine, for captures without a
/// real database server
pub struct FixtureSource {
    connection: Connection,
    tables: Vec<(String, Vec<String>)>,
}

impl FixtureSource {
    pub fn new() -> Self {
        Self {
            connection: Connection::open_in_memory().unwrap(),
            tables: Vec::new(),
        }
    }

    /// Run setup DDL and register the table with its primary keys. Passing
    /// empty DDL registers a table that does not exist, which makes its
    /// capture fail.
    pub fn with_table(mut self, name: &str, setup_sql: &str, primary_keys: &[&str]) -> Self {
        if !setup_sql.is_empty() {
            self.connection.execute_batch(setup_sql).unwrap();
        }
        self.tables.push((
            name.to_string(),
            primary_keys.iter().map(|k| k.to_string()).collect(),
        ));
        self
    }
}

impl SourceConnection for FixtureSource {
    fn connection(&self) -> &Connection {
        &self.connection
    }

    fn list_tables(&self, _schema: &str) -> Result<Vec<String>> {
        Ok(self.tables.iter().map(|(name, _)| name.clone()).collect())
    }

    fn primary_keys(&self, _schema: &str, table: &str) -> Vec<String> {
        self.tables
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, keys)| keys.clone())
            .unwrap_or_default()
    }

    fn table_query(&self, _schema: &str, table: &str) -> String {
        format!("SELECT * FROM {table}")
    }
}

/// Write a Parquet fixture file from a query over an in-memory engine,
/// returning its filesystem path
pub fn parquet_fixture(dir: &TempDir, name: &str, setup_sql: &str, query: &str) -> PathBuf {
    let connection = Connection::open_in_memory().unwrap();
    connection.execute_batch(setup_sql).unwrap();
    let path = dir.path().join(name);
    tablesnap_core::codec::write_table_file(&connection, query, &path).unwrap();
    path
}
