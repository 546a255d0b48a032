//! S3-compatible bucket client.

use std::path::Path;

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{Builder, Region};
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use tracing::{debug, info};

use remix_pool::{ApiKey, CredentialPool, PoolConfig};

use crate::error::{StorageError, StorageResult};
use crate::uri::ObjectUri;

/// Configuration for the bucket client.
#[derive(Debug, Clone)]
pub struct BucketConfig {
    /// S3 API endpoint URL
    pub endpoint_url: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    /// Region ("auto" for R2-style endpoints)
    pub region: String,
}

impl BucketConfig {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        let required = |name: &str| {
            std::env::var(name).map_err(|_| StorageError::config_error(format!("{name} not set")))
        };
        Ok(Self {
            endpoint_url: required("STORAGE_ENDPOINT_URL")?,
            access_key_id: required("STORAGE_ACCESS_KEY_ID")?,
            secret_access_key: required("STORAGE_SECRET_ACCESS_KEY")?,
            bucket_name: required("STORAGE_BUCKET")?,
            region: std::env::var("STORAGE_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Object storage client. Cheap to clone.
#[derive(Clone)]
pub struct BucketClient {
    client: Client,
    bucket: String,
    pool: CredentialPool,
}

impl BucketClient {
    pub fn new(config: BucketConfig, pool_config: PoolConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "remix-storage",
        );

        let sdk_config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region))
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        // One credential pair; the pool supplies backoff and throttling.
        let pool = CredentialPool::new(
            "storage",
            vec![ApiKey::new(&config.access_key_id)],
            pool_config,
        );

        Self {
            client: Client::from_conf(sdk_config),
            bucket: config.bucket_name,
            pool,
        }
    }

    /// Create from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self::new(BucketConfig::from_env()?, PoolConfig::from_env("STORAGE")))
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    /// URI of `key` in this bucket.
    pub fn uri_for(&self, key: &str) -> ObjectUri {
        ObjectUri::new(&self.bucket, key)
    }

    /// Upload bytes under `key` and return the object's URI.
    pub async fn put(&self, data: Vec<u8>, key: &str, content_type: &str) -> StorageResult<ObjectUri> {
        debug!("Uploading {} bytes to {}", data.len(), key);
        let size = data.len();

        self.pool
            .call("put_object", |_key| {
                let request = self
                    .client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(key)
                    .body(ByteStream::from(data.clone()))
                    .content_type(content_type);
                async move {
                    request.send().await.map_err(|e| {
                        let status = sdk_status(&e);
                        if is_transport(&e) {
                            StorageError::Transport(e.to_string())
                        } else {
                            StorageError::upload_failed(e.to_string(), status)
                        }
                    })
                }
            })
            .await?;

        let uri = self.uri_for(key);
        info!(bytes = size, uri = %uri, "Uploaded object");
        Ok(uri)
    }

    /// Upload a local file under `key`.
    pub async fn put_file(
        &self,
        path: impl AsRef<Path>,
        key: &str,
        content_type: &str,
    ) -> StorageResult<ObjectUri> {
        let data = tokio::fs::read(path.as_ref()).await?;
        self.put(data, key, content_type).await
    }

    /// Fetch the bytes behind `uri`.
    pub async fn get(&self, uri: &str) -> StorageResult<Vec<u8>> {
        let parsed: ObjectUri = uri.parse()?;
        if parsed.bucket != self.bucket {
            return Err(StorageError::invalid_uri(format!(
                "{} is not in bucket {}",
                uri, self.bucket
            )));
        }
        debug!("Downloading {}", parsed.key);

        let bytes = self
            .pool
            .call("get_object", |_key| {
                let request = self
                    .client
                    .get_object()
                    .bucket(&parsed.bucket)
                    .key(&parsed.key);
                let key = parsed.key.clone();
                async move {
                    let response = request.send().await.map_err(|e| {
                        let no_such_key = e
                            .as_service_error()
                            .map(|se| se.is_no_such_key())
                            .unwrap_or(false);
                        if no_such_key {
                            StorageError::not_found(&key)
                        } else if is_transport(&e) {
                            StorageError::Transport(e.to_string())
                        } else {
                            StorageError::download_failed(e.to_string(), sdk_status(&e))
                        }
                    })?;

                    let data = response
                        .body
                        .collect()
                        .await
                        .map_err(|e| StorageError::Transport(e.to_string()))?;
                    Ok::<_, StorageError>(data.into_bytes().to_vec())
                }
            })
            .await?;

        Ok(bytes)
    }

    /// Fetch `uri` into a local file.
    pub async fn get_to_file(&self, uri: &str, path: impl AsRef<Path>) -> StorageResult<()> {
        let path = path.as_ref();
        let bytes = self.get(uri).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;

        info!("Downloaded {} to {}", uri, path.display());
        Ok(())
    }
}

fn sdk_status<E>(err: &SdkError<E>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

fn is_transport<E>(err: &SdkError<E>) -> bool {
    matches!(
        err,
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_)
    )
}
