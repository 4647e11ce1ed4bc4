//! Write-through cache decorator for remote storage backends

use super::StorageBackend;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

type DownloadOutcome = std::result::Result<PathBuf, String>;

/// Wraps a remote backend and materializes objects into a local cache
/// directory on first access. Concurrent requests for the same uncached path
/// join a single in-flight download; the registry entry is cleared once the
/// download settles so a failed transfer is retried on the next call instead
/// of being replayed from the registry.
pub struct CachedStorage {
    inner: Arc<dyn StorageBackend>,
    cache_dir: PathBuf,
    inflight: Mutex<HashMap<String, Arc<OnceCell<DownloadOutcome>>>>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn StorageBackend>, cache_dir: PathBuf) -> Self {
        Self {
            inner,
            cache_dir,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn cached_path(&self, path: &str) -> PathBuf {
        self.cache_dir.join(path)
    }

    /// Remove every cached object
    pub fn flush(&self) -> Result<()> {
        if self.cache_dir.exists() {
            std::fs::remove_dir_all(&self.cache_dir)?;
        }
        std::fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<PathBuf> {
        let target = self.cached_path(path);
        let parent = target
            .parent()
            .ok_or_else(|| anyhow::anyhow!("cache path has no parent: {}", target.display()))?;
        std::fs::create_dir_all(parent)?;

        let data = self.inner.read(path).await?;

        // Stage into a temp file and rename so partially-written entries are
        // never observed by other readers.
        let temp = tempfile::NamedTempFile::new_in(parent)?;
        std::fs::write(temp.path(), &data)?;
        temp.persist(&target)
            .map_err(|e| anyhow::anyhow!("failed to move cache entry into place: {e}"))?;

        log::debug!("cached {} -> {}", path, target.display());
        Ok(target)
    }

    fn evict(&self, path: &str) {
        let cached = self.cached_path(path);
        if cached.exists() {
            if let Err(e) = std::fs::remove_file(&cached) {
                log::warn!("failed to evict cache entry {}: {e}", cached.display());
            }
        }
    }

    fn evict_prefix(&self, prefix: &str) {
        let cached = self.cached_path(prefix);
        if cached.is_dir() {
            if let Err(e) = std::fs::remove_dir_all(&cached) {
                log::warn!("failed to evict cache prefix {}: {e}", cached.display());
            }
        } else if cached.exists() {
            self.evict(prefix);
        }
    }
}

#[async_trait]
impl StorageBackend for CachedStorage {
    fn base_location(&self) -> String {
        self.inner.base_location()
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.inner.write(path, data).await?;
        // A rewritten object must not be served from a stale local copy
        self.evict(path);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let cached = self.cached_path(path);
        if cached.exists() {
            return Ok(std::fs::read(cached)?);
        }
        let local = self.uri_for(path).await?;
        Ok(std::fs::read(local)?)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await?;
        self.evict(path);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.inner.delete_prefix(prefix).await?;
        self.evict_prefix(prefix);
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        if self.cached_path(path).exists() {
            return Ok(true);
        }
        self.inner.exists(path).await
    }

    async fn uri_for(&self, path: &str) -> Result<String> {
        let cached = self.cached_path(path);
        if cached.exists() {
            return Ok(cached.to_string_lossy().to_string());
        }

        let cell = {
            let mut inflight = self.inflight.lock().await;
            inflight
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let outcome = cell
            .get_or_init(|| async {
                self.download(path).await.map_err(|e| e.to_string())
            })
            .await
            .clone();

        // Clear the registry entry once the transfer has settled, success or
        // failure, so the next caller re-checks the cache or retries.
        {
            let mut inflight = self.inflight.lock().await;
            inflight.remove(path);
        }

        match outcome {
            Ok(local) => Ok(local.to_string_lossy().to_string()),
            Err(message) => Err(anyhow::anyhow!("download of '{path}' failed: {message}")),
        }
    }

    async fn test_connection(&self) -> Result<bool> {
        self.inner.test_connection().await
    }
}
