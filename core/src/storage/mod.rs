use crate::config::StorageConfig;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Base location of this backend, for diagnostics
    fn base_location(&self) -> String;

    /// Write a file to storage
    async fn write(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Read a file from storage
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// List file paths under a prefix (recursive, relative to the backend root)
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Delete a single file
    async fn delete(&self, path: &str) -> Result<()>;

    /// Delete every file under a prefix
    async fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// Check if a file exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Location the SQL engine can read directly: a local filesystem path,
    /// or an already-materialized local copy of a remote object.
    async fn uri_for(&self, path: &str) -> Result<String>;

    /// Probe the backend for reachability
    async fn test_connection(&self) -> Result<bool>;
}

pub mod cache;
pub mod local;
pub mod s3;

pub use cache::CachedStorage;
pub use local::LocalStorage;
pub use s3::S3Storage;

/// Create a storage backend for the given configuration. Remote backends are
/// wrapped in the write-through cache decorator so the query engine always
/// receives local file URIs.
pub async fn create_storage_backend(
    config: &StorageConfig,
    cache_dir: &std::path::Path,
) -> Result<Arc<dyn StorageBackend>> {
    match config {
        StorageConfig::Local { path } => Ok(Arc::new(LocalStorage::new(path.clone()))),
        StorageConfig::S3 { .. } => {
            let s3 = S3Storage::new(config).await?;
            Ok(Arc::new(CachedStorage::new(
                Arc::new(s3),
                cache_dir.to_path_buf(),
            )))
        }
    }
}
