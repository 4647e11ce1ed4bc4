use crate::error::{Result, TablesnapError};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub storage: StorageConfigToml,
    #[serde(default)]
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub prefix: String,
    pub region: String,
    /// Custom endpoint for S3-compatible object stores
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfigToml {
    pub backend: StorageKind,
    #[serde(default)]
    pub local: Option<LocalStorageConfig>,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

/// Write-through cache settings for remote backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

// Runtime config that includes credentials resolved from the environment
#[derive(Debug, Clone, PartialEq)]
pub enum StorageConfig {
    Local {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        prefix: String,
        region: String,
        endpoint: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
    },
}

impl Default for StorageKind {
    fn default() -> Self {
        Self::Local
    }
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".tablesnap"),
        }
    }
}

impl Default for S3StorageConfig {
    fn default() -> Self {
        Self {
            bucket: "my-tablesnap-bucket".to_string(),
            prefix: "snapshots".to_string(),
            region: "us-west-2".to_string(),
            endpoint: None,
        }
    }
}

impl Default for StorageConfigToml {
    fn default() -> Self {
        Self {
            backend: StorageKind::default(),
            local: Some(LocalStorageConfig::default()),
            s3: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            dir: base.join("tablesnap"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfigToml::default().to_runtime()
    }
}

impl StorageConfigToml {
    pub fn to_runtime(&self) -> StorageConfig {
        match self.backend {
            StorageKind::Local => {
                let default_local = LocalStorageConfig::default();
                let local = self.local.as_ref().unwrap_or(&default_local);
                StorageConfig::Local {
                    path: local.path.clone(),
                }
            }
            StorageKind::S3 => {
                let default_s3 = S3StorageConfig::default();
                let s3 = self.s3.as_ref().unwrap_or(&default_s3);
                StorageConfig::S3 {
                    bucket: s3.bucket.clone(),
                    prefix: s3.prefix.clone(),
                    region: s3.region.clone(),
                    endpoint: s3.endpoint.clone(),
                    access_key_id: env::var("AWS_ACCESS_KEY_ID").ok(),
                    secret_access_key: env::var("AWS_SECRET_ACCESS_KEY").ok(),
                }
            }
        }
    }

    pub fn from_runtime(runtime: &StorageConfig) -> Self {
        match runtime {
            StorageConfig::Local { path } => Self {
                backend: StorageKind::Local,
                local: Some(LocalStorageConfig { path: path.clone() }),
                s3: None,
            },
            StorageConfig::S3 {
                bucket,
                prefix,
                region,
                endpoint,
                ..
            } => Self {
                backend: StorageKind::S3,
                local: None,
                s3: Some(S3StorageConfig {
                    bucket: bucket.clone(),
                    prefix: prefix.clone(),
                    region: region.clone(),
                    endpoint: endpoint.clone(),
                }),
            },
        }
    }
}

impl Config {
    /// Load configuration from a `tablesnap.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| TablesnapError::config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Load configuration from `tablesnap.toml` in the given directory,
    /// falling back to defaults when no file exists.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let path = dir.join("tablesnap.toml");
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TablesnapError::config(format!("failed to serialize config: {e}")))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_local() {
        let config = Config::default();
        assert_eq!(config.storage.backend, StorageKind::Local);
        assert!(matches!(
            config.storage.to_runtime(),
            StorageConfig::Local { .. }
        ));
    }

    #[test]
    fn toml_round_trip() {
        let toml_str = r#"
[storage]
backend = "s3"

[storage.s3]
bucket = "snapshots"
prefix = "prod"
region = "eu-west-1"
endpoint = "http://minio:9000"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        match config.storage.to_runtime() {
            StorageConfig::S3 {
                bucket,
                prefix,
                region,
                endpoint,
                ..
            } => {
                assert_eq!(bucket, "snapshots");
                assert_eq!(prefix, "prod");
                assert_eq!(region, "eu-west-1");
                assert_eq!(endpoint.as_deref(), Some("http://minio:9000"));
            }
            other => panic!("unexpected config: {other:?}"),
        }
    }

    #[test]
    fn from_runtime_preserves_backend() {
        let runtime = StorageConfig::Local {
            path: PathBuf::from("/srv/snapshots"),
        };
        let toml_form = StorageConfigToml::from_runtime(&runtime);
        assert_eq!(toml_form.backend, StorageKind::Local);
        assert_eq!(toml_form.to_runtime(), runtime);
    }
}
