//! Snapshot capture lifecycle
//!
//! Orchestrates a capture run end to end: run-exclusivity check, per-table
//! extraction through the codec, monthly rollup on the first of the month,
//! and retention enforcement. Table-level failures are accumulated into the
//! snapshot's error message; only a source connection failure aborts a run.

use crate::catalog::Catalog;
use crate::codec;
use crate::error::{Result, TablesnapError};
use crate::model::{Datasource, SnapshotKind, SnapshotMeta, SnapshotStatus, TableMeta};
use crate::source::{filter_tables, AttachedSource, SourceConnection};
use crate::storage::StorageBackend;
use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::future::Future;
use std::sync::Arc;

/// A RUNNING snapshot older than this is presumed crashed and force-failed
/// before a new run is allowed
pub const STALENESS_WINDOW_MINUTES: i64 = 30;

pub struct SnapshotLifecycle {
    backend: Arc<dyn StorageBackend>,
}

impl SnapshotLifecycle {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    fn catalog(&self) -> Catalog {
        Catalog::new(self.backend.clone())
    }

    fn run<F, T>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime
            .block_on(fut)
            .map_err(|e| TablesnapError::storage(e.to_string()))
    }

    /// Capture a daily snapshot of one datasource.
    ///
    /// The RUNNING record is persisted before extraction starts so that
    /// conflicting triggers are detected even if this process crashes
    /// mid-capture. The exclusivity check is read-then-write, not a lock;
    /// two triggers racing past it simultaneously is an accepted gap.
    pub fn take_snapshot(&self, datasource_id: &str) -> Result<SnapshotMeta> {
        let catalog = self.catalog();
        let datasource = catalog.load_datasource(datasource_id)?;
        self.take_snapshot_with(&datasource, Utc::now().date_naive(), |ds| {
            AttachedSource::connect(ds).map(|s| Box::new(s) as Box<dyn SourceConnection>)
        })
    }

    /// Capture driven by an explicit logical date and source connector.
    /// `take_snapshot` routes through here with the real dialect adapter.
    pub fn take_snapshot_with<C>(
        &self,
        datasource: &Datasource,
        logical_date: NaiveDate,
        connect: C,
    ) -> Result<SnapshotMeta>
    where
        C: FnOnce(&Datasource) -> Result<Box<dyn SourceConnection>>,
    {
        let catalog = self.catalog();
        self.ensure_not_running(&catalog, datasource)?;

        let mut meta = SnapshotMeta::begin(datasource, SnapshotKind::Daily, logical_date);
        catalog.save_snapshot(&meta)?;

        let source = match connect(datasource) {
            Ok(source) => source,
            Err(e) => {
                meta.mark_failed(e.to_string());
                catalog.save_snapshot(&meta)?;
                return Err(e);
            }
        };

        let errors = self.capture_tables(&mut meta, datasource, source.as_ref());
        if errors.is_empty() {
            meta.mark_completed();
        } else {
            meta.mark_failed(errors.join("; "));
        }
        catalog.save_snapshot(&meta)?;

        if meta.status == SnapshotStatus::Completed && logical_date.day() == 1 {
            if let Err(e) = self.roll_up_monthly(&catalog, datasource, &meta) {
                log::warn!(
                    "monthly rollup for snapshot {} failed: {e}; daily capture is unaffected",
                    meta.id
                );
            }
        }

        self.apply_retention(&catalog, datasource, SnapshotKind::Daily);
        self.apply_retention(&catalog, datasource, SnapshotKind::Monthly);

        Ok(meta)
    }

    fn ensure_not_running(&self, catalog: &Catalog, datasource: &Datasource) -> Result<()> {
        if let Some(mut running) = catalog.find_running(&datasource.id)? {
            let age = Utc::now() - running.started_at;
            if age > Duration::minutes(STALENESS_WINDOW_MINUTES) {
                log::warn!(
                    "snapshot {} for '{}' has been RUNNING for {} minutes, marking stale",
                    running.id,
                    datasource.name,
                    age.num_minutes()
                );
                running.mark_failed(format!(
                    "stale: still RUNNING after {} minutes, presumed crashed",
                    age.num_minutes()
                ));
                catalog.save_snapshot(&running)?;
            } else {
                return Err(TablesnapError::AlreadyRunning {
                    datasource: datasource.name.clone(),
                    started_at: running.started_at,
                });
            }
        }
        Ok(())
    }

    /// Extract every configured table, appending a `TableMeta` per success
    /// and an error string per failure. Failures never abort the loop.
    fn capture_tables(
        &self,
        meta: &mut SnapshotMeta,
        datasource: &Datasource,
        source: &dyn SourceConnection,
    ) -> Vec<String> {
        let mut errors = Vec::new();

        let schemas = if datasource.schemas.is_empty() {
            vec!["main".to_string()]
        } else {
            datasource.schemas.clone()
        };

        for schema in &schemas {
            let tables = match source.list_tables(schema) {
                Ok(tables) => filter_tables(datasource, tables),
                Err(e) => {
                    errors.push(format!("schema '{schema}': {e}"));
                    continue;
                }
            };

            for table in tables {
                match self.capture_one_table(meta, source, schema, &table) {
                    Ok(table_meta) => {
                        log::info!(
                            "captured {}.{} ({} rows, {} bytes)",
                            schema,
                            table,
                            table_meta.row_count,
                            table_meta.byte_size
                        );
                        meta.tables.push(table_meta);
                    }
                    Err(e) => errors.push(format!("{schema}.{table}: {e}")),
                }
            }
        }

        errors
    }

    fn capture_one_table(
        &self,
        meta: &SnapshotMeta,
        source: &dyn SourceConnection,
        schema: &str,
        table: &str,
    ) -> Result<TableMeta> {
        let query = source.table_query(schema, table);
        let (bytes, info) = codec::encode_table(source.connection(), &query)?;

        let storage_path = meta.table_path(schema, table);
        self.run(self.backend.write(&storage_path, &bytes))?;

        let primary_keys = source.primary_keys(schema, table);

        Ok(TableMeta {
            schema: schema.to_string(),
            table: table.to_string(),
            row_count: info.row_count,
            byte_size: info.byte_size,
            storage_path,
            primary_keys,
        })
    }

    /// Duplicate a completed daily snapshot's files into a MONTHLY snapshot.
    /// Rollups are physical copies with their own identity, never shared
    /// file references.
    fn roll_up_monthly(
        &self,
        catalog: &Catalog,
        datasource: &Datasource,
        daily: &SnapshotMeta,
    ) -> Result<SnapshotMeta> {
        let mut monthly = SnapshotMeta::begin(datasource, SnapshotKind::Monthly, daily.logical_date);
        catalog.save_snapshot(&monthly)?;

        // A monthly record left RUNNING would block the next capture until
        // the staleness window expires. Settle it before returning.
        if let Err(e) = self.copy_tables(&mut monthly, daily) {
            monthly.mark_failed(e.to_string());
            catalog.save_snapshot(&monthly)?;
            return Err(e);
        }

        monthly.mark_completed();
        catalog.save_snapshot(&monthly)?;
        log::info!(
            "rolled up daily snapshot {} into monthly snapshot {}",
            daily.id,
            monthly.id
        );
        Ok(monthly)
    }

    fn copy_tables(&self, monthly: &mut SnapshotMeta, daily: &SnapshotMeta) -> Result<()> {
        for table in &daily.tables {
            let bytes = self.run(self.backend.read(&table.storage_path))?;
            let target = monthly.table_path(&table.schema, &table.table);
            self.run(self.backend.write(&target, &bytes))?;
            monthly.tables.push(TableMeta {
                storage_path: target,
                ..table.clone()
            });
        }
        Ok(())
    }

    /// Delete the oldest COMPLETED snapshots of one kind beyond the
    /// datasource's cap. A cap of zero means unlimited. Deletion failures
    /// are logged, never propagated.
    pub fn apply_retention(&self, catalog: &Catalog, datasource: &Datasource, kind: SnapshotKind) {
        let cap = datasource.retention.cap_for(kind);
        if cap == 0 {
            return;
        }

        let snapshots = match catalog.list_snapshots(&datasource.id) {
            Ok(snapshots) => snapshots,
            Err(e) => {
                log::warn!("retention scan for '{}' failed: {e}", datasource.name);
                return;
            }
        };

        // list_snapshots orders by logical date ascending, oldest first
        let completed: Vec<&SnapshotMeta> = snapshots
            .iter()
            .filter(|s| s.kind == kind && s.status == SnapshotStatus::Completed)
            .collect();
        if completed.len() <= cap as usize {
            return;
        }

        let excess = completed.len() - cap as usize;
        for snapshot in completed.into_iter().take(excess) {
            match catalog.delete_snapshot(snapshot) {
                Ok(()) => log::info!(
                    "retention deleted {:?} snapshot {} ({})",
                    kind,
                    snapshot.id,
                    snapshot.logical_date
                ),
                Err(e) => log::warn!("retention delete of {} failed: {e}", snapshot.id),
            }
        }
    }

    /// Delete one snapshot's files and metadata record
    pub fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let catalog = self.catalog();
        let meta = catalog.load_snapshot(snapshot_id)?;
        catalog.delete_snapshot(&meta)
    }
}
