//! Metadata records for datasources, snapshots and captured tables

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceDialect {
    Mysql,
    Postgresql,
    Sqlite,
}

impl fmt::Display for SourceDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDialect::Mysql => write!(f, "mysql"),
            SourceDialect::Postgresql => write!(f, "postgresql"),
            SourceDialect::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Per-datasource retention caps; `0` means unlimited.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RetentionPolicy {
    pub daily_max_count: u32,
    pub monthly_max_count: u32,
}

impl RetentionPolicy {
    pub fn cap_for(&self, kind: SnapshotKind) -> u32 {
        match kind {
            SnapshotKind::Daily => self.daily_max_count,
            SnapshotKind::Monthly => self.monthly_max_count,
        }
    }
}

/// Connection descriptor for a source database.
///
/// Identity (`id`) is immutable; connection and schedule fields are mutable.
/// The password is never stored in the record, only the name of the
/// environment variable that holds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    pub id: String,
    pub name: String,
    pub dialect: SourceDialect,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password_env: Option<String>,
    /// Direct connection string (alternative to individual fields)
    pub connection_string: Option<String>,
    /// Schemas to capture
    pub schemas: Vec<String>,
    /// Tables to include (supports patterns like "users" or "*" for all)
    #[serde(default)]
    pub tables: Vec<String>,
    /// Tables to exclude (supports patterns like "temp_*")
    #[serde(default)]
    pub exclude_tables: Vec<String>,
    /// Cron expression for scheduled captures
    pub schedule: Option<String>,
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub memo: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotKind {
    Daily,
    Monthly,
}

impl SnapshotKind {
    /// Path segment used in the storage layout
    pub fn path_segment(&self) -> &'static str {
        match self {
            SnapshotKind::Daily => "daily",
            SnapshotKind::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum SnapshotStatus {
    Running,
    Completed,
    Failed,
}

/// One captured table within a snapshot. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    pub schema: String,
    pub table: String,
    pub row_count: u64,
    pub byte_size: u64,
    /// Storage path of the columnar file, relative to the backend root
    pub storage_path: String,
    /// Primary key column names; empty when undiscoverable
    #[serde(default)]
    pub primary_keys: Vec<String>,
}

impl TableMeta {
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// One capture run of a datasource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    pub datasource_id: String,
    pub datasource_name: String,
    pub kind: SnapshotKind,
    pub logical_date: NaiveDate,
    pub status: SnapshotStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableMeta>,
}

impl SnapshotMeta {
    pub fn begin(datasource: &Datasource, kind: SnapshotKind, logical_date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            datasource_id: datasource.id.clone(),
            datasource_name: datasource.name.clone(),
            kind,
            logical_date,
            status: SnapshotStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
            tags: Vec::new(),
            memo: None,
            tables: Vec::new(),
        }
    }

    pub fn mark_completed(&mut self) {
        self.status = SnapshotStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.error_message = None;
    }

    pub fn mark_failed(&mut self, message: impl Into<String>) {
        self.status = SnapshotStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_message = Some(message.into());
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SnapshotStatus::Completed | SnapshotStatus::Failed
        )
    }

    /// Storage prefix holding this snapshot's files:
    /// `{datasourceName}/{daily|monthly}/{ISO date}/{snapshotId}/`
    pub fn storage_prefix(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.datasource_name,
            self.kind.path_segment(),
            self.logical_date.format("%Y-%m-%d"),
            self.id
        )
    }

    /// Storage path for one captured table's columnar file
    pub fn table_path(&self, schema: &str, table: &str) -> String {
        format!("{}/{schema}.{table}.parquet", self.storage_prefix())
    }

    pub fn find_table(&self, table_name: &str) -> Option<&TableMeta> {
        self.tables
            .iter()
            .find(|t| t.table == table_name || t.full_name() == table_name)
    }
}
