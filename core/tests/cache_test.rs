//! Write-through cache behavior under concurrency

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tablesnap_core::storage::{CachedStorage, LocalStorage, StorageBackend};
use tempfile::TempDir;

/// Delegating backend that counts reads and can fail them on demand
struct CountingBackend {
    inner: LocalStorage,
    reads: AtomicUsize,
    failures_left: AtomicUsize,
}

impl CountingBackend {
    fn new(inner: LocalStorage) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    fn fail_next_reads(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    fn base_location(&self) -> String {
        self.inner.base_location()
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        self.inner.write(path, data).await
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        // Simulated transfer latency widens the race window
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            anyhow::bail!("simulated transfer failure");
        }
        self.inner.read(path).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.inner.delete(path).await
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        self.inner.delete_prefix(prefix).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn uri_for(&self, path: &str) -> Result<String> {
        self.inner.uri_for(path).await
    }

    async fn test_connection(&self) -> Result<bool> {
        self.inner.test_connection().await
    }
}

struct CacheFixture {
    _temp: TempDir,
    counting: Arc<CountingBackend>,
    cache: Arc<CachedStorage>,
}

fn fixture() -> CacheFixture {
    let temp = TempDir::new().unwrap();
    let counting = Arc::new(CountingBackend::new(LocalStorage::new(
        temp.path().join("remote"),
    )));
    let cache = Arc::new(CachedStorage::new(
        counting.clone() as Arc<dyn StorageBackend>,
        temp.path().join("cache"),
    ));
    CacheFixture {
        _temp: temp,
        counting,
        cache,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_resolutions_share_one_download() {
    let fx = fixture();
    fx.counting
        .write("data/users.parquet", b"columnar bytes")
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let cache = fx.cache.clone();
        handles.push(tokio::spawn(async move {
            cache.uri_for("data/users.parquet").await
        }));
    }

    let mut uris = Vec::new();
    for handle in handles {
        uris.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fx.counting.read_count(), 1);
    assert!(uris.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(
        std::fs::read(&uris[0]).unwrap(),
        b"columnar bytes".to_vec()
    );
}

#[tokio::test]
async fn cache_hit_skips_the_backend_entirely() {
    let fx = fixture();
    fx.counting
        .write("data/users.parquet", b"columnar bytes")
        .await
        .unwrap();

    let first = fx.cache.uri_for("data/users.parquet").await.unwrap();
    let second = fx.cache.uri_for("data/users.parquet").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(fx.counting.read_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_download_is_observed_by_all_waiters_then_retried() {
    let fx = fixture();
    fx.counting
        .write("data/users.parquet", b"columnar bytes")
        .await
        .unwrap();
    fx.counting.fail_next_reads(1);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = fx.cache.clone();
        handles.push(tokio::spawn(async move {
            cache.uri_for("data/users.parquet").await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_err());
    }
    assert_eq!(fx.counting.read_count(), 1);

    // The registry entry was cleared on failure, so the next call retries
    let uri = fx.cache.uri_for("data/users.parquet").await.unwrap();
    assert_eq!(std::fs::read(uri).unwrap(), b"columnar bytes".to_vec());
    assert_eq!(fx.counting.read_count(), 2);
}

#[tokio::test]
async fn delete_evicts_the_cached_copy() {
    let fx = fixture();
    fx.counting
        .write("data/users.parquet", b"columnar bytes")
        .await
        .unwrap();

    let uri = fx.cache.uri_for("data/users.parquet").await.unwrap();
    assert!(std::path::Path::new(&uri).exists());

    fx.cache.delete("data/users.parquet").await.unwrap();
    assert!(!std::path::Path::new(&uri).exists());
    assert!(!fx.cache.exists("data/users.parquet").await.unwrap());
}

#[tokio::test]
async fn delete_prefix_evicts_every_entry_under_it() {
    let fx = fixture();
    fx.counting.write("snap/a.parquet", b"a").await.unwrap();
    fx.counting.write("snap/b.parquet", b"b").await.unwrap();

    let a = fx.cache.uri_for("snap/a.parquet").await.unwrap();
    let b = fx.cache.uri_for("snap/b.parquet").await.unwrap();

    fx.cache.delete_prefix("snap").await.unwrap();
    assert!(!std::path::Path::new(&a).exists());
    assert!(!std::path::Path::new(&b).exists());
}

#[tokio::test]
async fn rewrite_invalidates_the_stale_cached_copy() {
    let fx = fixture();
    fx.counting.write("data/t.parquet", b"v1").await.unwrap();
    let first = fx.cache.uri_for("data/t.parquet").await.unwrap();
    assert_eq!(std::fs::read(&first).unwrap(), b"v1".to_vec());

    fx.cache.write("data/t.parquet", b"v2").await.unwrap();
    let second = fx.cache.uri_for("data/t.parquet").await.unwrap();
    assert_eq!(std::fs::read(&second).unwrap(), b"v2".to_vec());
}
