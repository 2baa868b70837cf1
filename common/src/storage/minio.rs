// MinIO storage client built on rust-s3

use crate::config::MinioConfig;
use crate::errors::StorageError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// MinIO client wrapper bound to one bucket
#[derive(Clone, Debug)]
pub struct MinioClient {
    bucket: Arc<Bucket>,
    bucket_name: String,
}

impl MinioClient {
    /// Create a new MinIO client from configuration
    #[instrument(skip(config), fields(endpoint = %config.endpoint, bucket = %config.bucket))]
    pub async fn new(config: &MinioConfig) -> Result<Self, StorageError> {
        info!("Initializing MinIO client");

        // rust-s3 Region::Custom expects the endpoint without a scheme
        let endpoint = config
            .endpoint
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .to_string();

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| {
            error!(error = %e, "Failed to create MinIO credentials");
            StorageError::MinioError(format!("Failed to create credentials: {}", e))
        })?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint,
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)
            .map_err(|e| {
                error!(error = %e, "Failed to create MinIO bucket handle");
                StorageError::MinioError(format!("Failed to create bucket: {}", e))
            })?
            .with_path_style();

        info!("MinIO client initialized successfully");

        Ok(Self {
            bucket: Arc::from(bucket),
            bucket_name: config.bucket.clone(),
        })
    }

    /// Verify the bucket is reachable by listing its root
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), StorageError> {
        debug!("Performing MinIO health check");

        self.bucket
            .list("".to_string(), Some("/".to_string()))
            .await
            .map_err(|e| {
                error!(error = %e, "MinIO health check failed");
                StorageError::MinioError(format!("Health check failed: {}", e))
            })?;

        debug!("MinIO health check passed");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MinioClient {
    #[instrument(skip(self), fields(bucket = %self.bucket_name))]
    async fn get_object(&self, key: &str, limit: usize) -> Result<Vec<u8>, StorageError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .bucket
            .get_object_range(key, 0, Some(limit as u64 - 1))
            .await
            .map_err(|e| {
                StorageError::MinioError(format!("Failed to get object '{}': {}", key, e))
            })?;

        match response.status_code() {
            200 | 206 => {}
            404 => return Err(StorageError::NotFound(key.to_string())),
            // An empty object cannot satisfy any byte range
            416 => return Err(StorageError::EmptyObject(key.to_string())),
            status => {
                return Err(StorageError::UnexpectedStatus {
                    path: key.to_string(),
                    status,
                })
            }
        }

        let mut data = response.bytes().to_vec();
        data.truncate(limit);

        debug!(size = data.len(), "Object window retrieved");
        Ok(data)
    }

    #[instrument(skip(self), fields(bucket = %self.bucket_name))]
    async fn remove_object(&self, key: &str) -> Result<(), StorageError> {
        let response = self.bucket.delete_object(key).await.map_err(|e| {
            StorageError::MinioError(format!("Failed to delete object '{}': {}", key, e))
        })?;

        match response.status_code() {
            200 | 204 => {
                debug!("Object deleted");
                Ok(())
            }
            status => Err(StorageError::UnexpectedStatus {
                path: key.to_string(),
                status,
            }),
        }
    }

    fn bucket_name(&self) -> &str {
        &self.bucket_name
    }
}
