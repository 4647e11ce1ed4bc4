//! Error taxonomy shared across the crate

use chrono::{DateTime, Utc};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TablesnapError>;

#[derive(Error, Debug)]
pub enum TablesnapError {
    #[error("datasource not found: {id}")]
    DatasourceNotFound { id: String },

    #[error("snapshot not found: {id}")]
    SnapshotNotFound { id: String },

    #[error("table '{table}' not found in snapshot {snapshot_id}")]
    TableNotFound { snapshot_id: String, table: String },

    #[error("a capture for datasource '{datasource}' is already running (started {started_at})")]
    AlreadyRunning {
        datasource: String,
        started_at: DateTime<Utc>,
    },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("query rejected: {message}")]
    QueryRejected { message: String },

    #[error("query execution failed: {message}")]
    QueryExecutionFailed { message: String },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(#[from] duckdb::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl TablesnapError {
    pub fn datasource_not_found(id: impl Into<String>) -> Self {
        TablesnapError::DatasourceNotFound { id: id.into() }
    }

    pub fn snapshot_not_found(id: impl Into<String>) -> Self {
        TablesnapError::SnapshotNotFound { id: id.into() }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        TablesnapError::ConnectionFailed {
            message: message.into(),
        }
    }

    pub fn query_rejected(message: impl Into<String>) -> Self {
        TablesnapError::QueryRejected {
            message: message.into(),
        }
    }

    pub fn query_execution(message: impl Into<String>) -> Self {
        TablesnapError::QueryExecutionFailed {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        TablesnapError::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TablesnapError::Config {
            message: message.into(),
        }
    }
}
