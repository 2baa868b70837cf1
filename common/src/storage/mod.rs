// Storage module: object store seam and its MinIO implementation

pub mod minio;

pub use minio::MinioClient;

use crate::errors::StorageError;
use async_trait::async_trait;

/// Key-based object access within a single bucket.
/// Implementations must be safe to share between workers.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Read at most `limit` leading bytes of the object at `key`
    async fn get_object(&self, key: &str, limit: usize) -> Result<Vec<u8>, StorageError>;

    async fn remove_object(&self, key: &str) -> Result<(), StorageError>;

    fn bucket_name(&self) -> &str;
}
