use super::StorageBackend;
use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use walkdir::WalkDir;

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        self.base_path.join(path)
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn base_location(&self) -> String {
        self.base_path.to_string_lossy().to_string()
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&full_path, data)?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let data = std::fs::read(self.full_path(path))?;
        Ok(data)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let root = self.full_path(prefix);
        let mut paths = Vec::new();

        if root.exists() {
            for entry in WalkDir::new(&root) {
                let entry = entry?;
                if entry.file_type().is_file() {
                    if let Ok(rel) = entry.path().strip_prefix(&self.base_path) {
                        paths.push(rel.to_string_lossy().replace('\\', "/"));
                    }
                }
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        std::fs::remove_file(self.full_path(path))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let root = self.full_path(prefix);
        if root.exists() {
            std::fs::remove_dir_all(&root)?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.full_path(path).exists())
    }

    async fn uri_for(&self, path: &str) -> Result<String> {
        Ok(self.full_path(path).to_string_lossy().to_string())
    }

    async fn test_connection(&self) -> Result<bool> {
        std::fs::create_dir_all(&self.base_path)?;
        Ok(self.base_path.is_dir())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn write_read_list_delete() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path().to_path_buf());

        storage.write("a/b/one.parquet", b"one").await.unwrap();
        storage.write("a/b/two.parquet", b"two").await.unwrap();
        storage.write("a/c/three.parquet", b"three").await.unwrap();

        assert_eq!(storage.read("a/b/one.parquet").await.unwrap(), b"one");
        assert!(storage.exists("a/b/two.parquet").await.unwrap());

        let listed = storage.list("a/b").await.unwrap();
        assert_eq!(listed, vec!["a/b/one.parquet", "a/b/two.parquet"]);

        storage.delete("a/b/one.parquet").await.unwrap();
        assert!(!storage.exists("a/b/one.parquet").await.unwrap());

        storage.delete_prefix("a").await.unwrap();
        assert!(storage.list("a").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn uri_is_local_path() {
        let temp = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp.path().to_path_buf());
        storage.write("x/data.parquet", b"bytes").await.unwrap();

        let uri = storage.uri_for("x/data.parquet").await.unwrap();
        assert!(std::path::Path::new(&uri).exists());
    }
}
