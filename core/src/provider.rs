//! Storage provider facade
//!
//! Holds the active storage configuration and a lazily-resolved, memoized
//! backend instance. The settings-update path calls [`StorageProvider::update`]
//! which synchronously invalidates the memoized backend and flushes the
//! on-disk cache; there is no background refresh.

use crate::config::{Config, StorageConfig};
use crate::error::{Result, TablesnapError};
use crate::storage::{create_storage_backend, StorageBackend};
use std::sync::{Arc, RwLock};

pub struct StorageProvider {
    config: RwLock<Config>,
    backend: RwLock<Option<Arc<dyn StorageBackend>>>,
}

impl StorageProvider {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            backend: RwLock::new(None),
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        self.config
            .read()
            .expect("storage config lock poisoned")
            .storage
            .to_runtime()
    }

    /// Resolve the concrete backend, memoizing it until the next refresh
    pub fn backend(&self) -> Result<Arc<dyn StorageBackend>> {
        if let Some(backend) = self
            .backend
            .read()
            .expect("storage backend lock poisoned")
            .as_ref()
        {
            return Ok(backend.clone());
        }

        let (storage_config, cache_dir) = {
            let config = self.config.read().expect("storage config lock poisoned");
            (config.storage.to_runtime(), config.cache.dir.clone())
        };

        let runtime = tokio::runtime::Runtime::new()?;
        let backend = runtime
            .block_on(create_storage_backend(&storage_config, &cache_dir))
            .map_err(|e| TablesnapError::storage(e.to_string()))?;

        let mut slot = self.backend.write().expect("storage backend lock poisoned");
        // Another thread may have resolved concurrently; keep the first one
        if let Some(existing) = slot.as_ref() {
            return Ok(existing.clone());
        }
        *slot = Some(backend.clone());
        Ok(backend)
    }

    /// Replace the active configuration. Invalidates the memoized backend and
    /// flushes the local cache directory before the next access re-resolves.
    pub fn update(&self, new_config: Config) -> Result<()> {
        {
            let mut config = self.config.write().expect("storage config lock poisoned");
            *config = new_config;
        }
        self.refresh()
    }

    /// Drop the memoized backend and clear cached remote objects
    pub fn refresh(&self) -> Result<()> {
        {
            let mut slot = self.backend.write().expect("storage backend lock poisoned");
            *slot = None;
        }

        let cache_dir = self
            .config
            .read()
            .expect("storage config lock poisoned")
            .cache
            .dir
            .clone();
        if cache_dir.exists() {
            std::fs::remove_dir_all(&cache_dir)?;
        }
        log::info!("storage provider refreshed, cache flushed");
        Ok(())
    }

    pub fn test_connection(&self) -> Result<bool> {
        let backend = self.backend()?;
        let runtime = tokio::runtime::Runtime::new()?;
        runtime
            .block_on(backend.test_connection())
            .map_err(|e| TablesnapError::storage(e.to_string()))
    }
}
