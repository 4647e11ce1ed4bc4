//! # tablesnap-core
//!
//! Core library for tablesnap - snapshots relational database tables into
//! immutable columnar Parquet files, then queries, previews, and diffs those
//! snapshots without touching the live source databases.
//!
//! This crate provides the core functionality that can be used by different
//! interfaces (CLI, web APIs, etc.).

pub mod catalog;
pub mod codec;
pub mod compare;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod provider;
pub mod query;
pub mod source;
pub mod sql;
pub mod storage;

// Re-export the most commonly used types for convenience
pub use catalog::Catalog;
pub use compare::{DiffKind, DiffRow, DiffSummary, UnifiedDiff};
pub use config::{Config, StorageConfig};
pub use error::{Result, TablesnapError};
pub use lifecycle::SnapshotLifecycle;
pub use model::{Datasource, RetentionPolicy, SnapshotKind, SnapshotMeta, SnapshotStatus, TableMeta};
pub use provider::StorageProvider;
pub use query::{ColumnInfo, QueryResult, QueryValue};
pub use storage::StorageBackend;
