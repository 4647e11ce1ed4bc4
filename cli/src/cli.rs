//! Command-line interface for tablesnap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tablesnap")]
#[command(about = "Snapshot relational database tables into immutable Parquet files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding tablesnap.toml (defaults to the current directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a default tablesnap.toml
    Init,

    /// Manage datasource definitions
    Datasource {
        #[command(subcommand)]
        command: DatasourceCommands,
    },

    /// Capture a snapshot of a datasource
    Snapshot {
        /// Datasource id
        datasource: String,
    },

    /// List snapshots of a datasource
    List {
        /// Datasource id
        datasource: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one snapshot's metadata
    Show {
        /// Snapshot id
        snapshot: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a snapshot and its storage files
    Delete {
        /// Snapshot id
        snapshot: String,
    },

    /// Run a read-only SQL query against one or more snapshots
    Query {
        /// SQL to execute (SELECT or WITH)
        sql: String,

        /// Snapshot to expose, as `snapshotId=alias` (repeatable)
        #[arg(long = "snapshot", value_name = "ID=ALIAS")]
        snapshots: Vec<String>,

        /// Rows per page (1-1000)
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Preview one table of a snapshot
    Preview {
        /// Snapshot id
        snapshot: String,

        /// Table name (`table` or `schema.table`)
        table: String,

        /// Boolean filter expression
        #[arg(long = "where")]
        where_clause: Option<String>,

        /// Sort terms, `column [ASC|DESC]` separated by commas
        #[arg(long)]
        order_by: Option<String>,

        /// Rows per page (1-1000)
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Unified diff of one table between two snapshots
    Diff {
        /// Left (older) snapshot id
        left: String,

        /// Right (newer) snapshot id
        right: String,

        /// Table name
        table: String,

        /// Rows per page (1-1000)
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Rows to skip
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Column statistics of one table across two snapshots
    Stats {
        /// Left snapshot id
        left: String,

        /// Right snapshot id
        right: String,

        /// Table name
        table: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum DatasourceCommands {
    /// Register a datasource from a JSON definition file
    Add {
        /// Path to the datasource definition
        file: PathBuf,
    },

    /// List registered datasources
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove a datasource record (snapshots are kept)
    Remove {
        /// Datasource id
        id: String,
    },
}
