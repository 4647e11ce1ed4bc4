use super::StorageBackend;
use crate::config::StorageConfig;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;

pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let StorageConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            ..
        } = config
        else {
            return Err(anyhow::anyhow!("S3Storage requires an S3 storage config"));
        };

        log::info!("Initializing S3 storage - bucket: {bucket}, prefix: {prefix}, region: {region}");

        let mut config_builder = aws_config::load_defaults(aws_config::BehaviorVersion::latest())
            .await
            .to_builder()
            .region(aws_config::Region::new(region.clone()));

        if let Some(endpoint) = endpoint {
            config_builder = config_builder.endpoint_url(endpoint.clone());
        }

        let sdk_config = config_builder.build();
        let client = Client::new(&sdk_config);

        Ok(Self {
            client,
            bucket: bucket.clone(),
            prefix: prefix.clone(),
        })
    }

    fn key_for(&self, path: &str) -> String {
        // Normalize Windows separators before they become object keys
        let normalized = path.replace('\\', "/");
        if self.prefix.is_empty() {
            normalized
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), normalized)
        }
    }

    fn path_from_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            key.strip_prefix(&format!("{}/", self.prefix.trim_end_matches('/')))
                .unwrap_or(key)
                .to_string()
        }
    }
}

#[async_trait]
impl StorageBackend for S3Storage {
    fn base_location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }

    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let key = self.key_for(path);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data.to_vec()))
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("failed to write s3://{}/{}: {e}", self.bucket, key)
            })?;
        log::debug!("wrote s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let key = self.key_for(path);
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("failed to read s3://{}/{}: {e}", self.bucket, key))?;
        let data = response.body.collect().await?;
        Ok(data.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let key_prefix = self.key_for(prefix);
        let mut paths = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&key_prefix);
            if let Some(token) = &continuation {
                request = request.continuation_token(token.clone());
            }

            let response = request.send().await.map_err(|e| {
                anyhow::anyhow!(
                    "failed to list s3://{}/{}: {e}",
                    self.bucket,
                    key_prefix
                )
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    paths.push(self.path_from_key(key));
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        paths.sort();
        Ok(paths)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let key = self.key_for(path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("failed to delete s3://{}/{}: {e}", self.bucket, key))?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        for path in self.list(prefix).await? {
            self.delete(&path).await?;
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = self.key_for(path);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn uri_for(&self, path: &str) -> Result<String> {
        Ok(format!("s3://{}/{}", self.bucket, self.key_for(path)))
    }

    async fn test_connection(&self) -> Result<bool> {
        match self
            .client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                log::error!("S3 connection test failed for bucket '{}': {e}", self.bucket);
                Ok(false)
            }
        }
    }
}
