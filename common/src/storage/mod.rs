// Object storage for tarballs, bookkeeping and CBMC output

pub mod bookkeeping;
pub mod memory;
pub mod s3;

pub use bookkeeping::BookkeepingStore;
pub use memory::InMemoryObjectStore;
pub use s3::S3ObjectStore;

use crate::errors::StorageError;
use async_trait::async_trait;
use std::path::Path;

/// A bucket of byte objects addressed by key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store writes to
    fn bucket_name(&self) -> &str;

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// `StorageError::NotFound` when the key does not exist
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn upload_file(&self, path: &Path, key: &str) -> Result<(), StorageError> {
        let data = tokio::fs::read(path).await?;
        self.put_object(key, &data).await
    }
}
