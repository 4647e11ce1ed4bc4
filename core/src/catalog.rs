//! Metadata catalog persisted through the storage backend
//!
//! Datasource records live under `datasources/{id}.json`, snapshot records
//! under `snapshots/{id}.json`. Captured table files live under the snapshot
//! path scheme and are owned by exactly one `TableMeta`.

use crate::error::{Result, TablesnapError};
use crate::model::{Datasource, SnapshotMeta, SnapshotStatus};
use crate::storage::StorageBackend;
use std::future::Future;
use std::sync::Arc;

const DATASOURCE_PREFIX: &str = "datasources";
const SNAPSHOT_PREFIX: &str = "snapshots";

#[derive(Clone)]
pub struct Catalog {
    backend: Arc<dyn StorageBackend>,
}

impl Catalog {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
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

    fn datasource_path(id: &str) -> String {
        format!("{DATASOURCE_PREFIX}/{id}.json")
    }

    fn snapshot_path(id: &str) -> String {
        format!("{SNAPSHOT_PREFIX}/{id}.json")
    }

    pub fn save_datasource(&self, datasource: &Datasource) -> Result<()> {
        let data = serde_json::to_vec_pretty(datasource)?;
        self.run(self.backend.write(&Self::datasource_path(&datasource.id), &data))
    }

    pub fn load_datasource(&self, id: &str) -> Result<Datasource> {
        let path = Self::datasource_path(id);
        let exists = self.run(self.backend.exists(&path))?;
        if !exists {
            return Err(TablesnapError::datasource_not_found(id));
        }
        let data = self.run(self.backend.read(&path))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn list_datasources(&self) -> Result<Vec<Datasource>> {
        let paths = self.run(self.backend.list(DATASOURCE_PREFIX))?;
        let mut datasources = Vec::new();
        for path in paths {
            let data = self.run(self.backend.read(&path))?;
            match serde_json::from_slice::<Datasource>(&data) {
                Ok(ds) => datasources.push(ds),
                Err(e) => log::warn!("skipping unreadable datasource record {path}: {e}"),
            }
        }
        datasources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(datasources)
    }

    pub fn delete_datasource(&self, id: &str) -> Result<()> {
        self.run(self.backend.delete(&Self::datasource_path(id)))
    }

    pub fn save_snapshot(&self, meta: &SnapshotMeta) -> Result<()> {
        let data = serde_json::to_vec_pretty(meta)?;
        self.run(self.backend.write(&Self::snapshot_path(&meta.id), &data))
    }

    pub fn load_snapshot(&self, id: &str) -> Result<SnapshotMeta> {
        let path = Self::snapshot_path(id);
        let exists = self.run(self.backend.exists(&path))?;
        if !exists {
            return Err(TablesnapError::snapshot_not_found(id));
        }
        let data = self.run(self.backend.read(&path))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// All snapshot records for a datasource, oldest logical date first
    pub fn list_snapshots(&self, datasource_id: &str) -> Result<Vec<SnapshotMeta>> {
        let paths = self.run(self.backend.list(SNAPSHOT_PREFIX))?;
        let mut snapshots = Vec::new();
        for path in paths {
            let data = self.run(self.backend.read(&path))?;
            match serde_json::from_slice::<SnapshotMeta>(&data) {
                Ok(meta) if meta.datasource_id == datasource_id => snapshots.push(meta),
                Ok(_) => {}
                Err(e) => log::warn!("skipping unreadable snapshot record {path}: {e}"),
            }
        }
        snapshots.sort_by(|a, b| {
            a.logical_date
                .cmp(&b.logical_date)
                .then_with(|| a.started_at.cmp(&b.started_at))
        });
        Ok(snapshots)
    }

    /// The RUNNING snapshot for a datasource, if any
    pub fn find_running(&self, datasource_id: &str) -> Result<Option<SnapshotMeta>> {
        let snapshots = self.list_snapshots(datasource_id)?;
        Ok(snapshots
            .into_iter()
            .find(|s| s.status == SnapshotStatus::Running))
    }

    /// Resolve a storage path to a URI the query engine can read directly.
    /// Behind a caching backend this may download the object first.
    pub fn resolve_uri(&self, path: &str) -> Result<String> {
        self.run(self.backend.uri_for(path))
    }

    /// Delete a snapshot's storage files and its metadata record
    pub fn delete_snapshot(&self, meta: &SnapshotMeta) -> Result<()> {
        self.run(self.backend.delete_prefix(&meta.storage_prefix()))?;
        self.run(self.backend.delete(&Self::snapshot_path(&meta.id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RetentionPolicy, SnapshotKind, SourceDialect};
    use crate::storage::LocalStorage;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn catalog(temp: &TempDir) -> Catalog {
        Catalog::new(Arc::new(LocalStorage::new(temp.path().to_path_buf())))
    }

    fn datasource(id: &str, name: &str) -> Datasource {
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
            retention: RetentionPolicy::default(),
            memo: None,
        }
    }

    #[test]
    fn datasource_round_trip() {
        let temp = TempDir::new().unwrap();
        let catalog = catalog(&temp);
        let ds = datasource("ds-1", "app");

        catalog.save_datasource(&ds).unwrap();
        let loaded = catalog.load_datasource("ds-1").unwrap();
        assert_eq!(loaded.name, "app");

        assert!(matches!(
            catalog.load_datasource("missing"),
            Err(TablesnapError::DatasourceNotFound { .. })
        ));
    }

    #[test]
    fn snapshot_listing_is_scoped_and_ordered() {
        let temp = TempDir::new().unwrap();
        let catalog = catalog(&temp);
        let ds_a = datasource("a", "alpha");
        let ds_b = datasource("b", "beta");

        for day in [3, 1, 2] {
            let date = NaiveDate::from_ymd_opt(2024, 5, day).unwrap();
            let meta = SnapshotMeta::begin(&ds_a, SnapshotKind::Daily, date);
            catalog.save_snapshot(&meta).unwrap();
        }
        let other = SnapshotMeta::begin(
            &ds_b,
            SnapshotKind::Daily,
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        );
        catalog.save_snapshot(&other).unwrap();

        let listed = catalog.list_snapshots("a").unwrap();
        assert_eq!(listed.len(), 3);
        let dates: Vec<u32> = listed.iter().map(|s| s.logical_date.format("%d").to_string().parse().unwrap()).collect();
        assert_eq!(dates, vec![1, 2, 3]);
    }

    #[test]
    fn find_running_and_delete() {
        let temp = TempDir::new().unwrap();
        let catalog = catalog(&temp);
        let ds = datasource("ds-1", "app");
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();

        let running = SnapshotMeta::begin(&ds, SnapshotKind::Daily, date);
        catalog.save_snapshot(&running).unwrap();
        let mut done = SnapshotMeta::begin(&ds, SnapshotKind::Daily, date);
        done.mark_completed();
        catalog.save_snapshot(&done).unwrap();

        let found = catalog.find_running("ds-1").unwrap().unwrap();
        assert_eq!(found.id, running.id);

        catalog.delete_snapshot(&running).unwrap();
        assert!(catalog.find_running("ds-1").unwrap().is_none());
    }
}
