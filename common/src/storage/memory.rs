// In-memory object store for tests and local dry runs

use crate::errors::StorageError;
use crate::storage::ObjectStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    name: String,
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new(bucket_name: impl Into<String>) -> Self {
        Self {
            name: bucket_name.into(),
            objects: Arc::default(),
        }
    }

    /// Stored keys, sorted
    pub fn keys(&self) -> Vec<String> {
        self.lock().map(|o| o.keys().cloned().collect()).unwrap_or_default()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.lock()
            .ok()?
            .get(key)
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>, StorageError> {
        self.objects
            .lock()
            .map_err(|e| StorageError::ObjectStore(format!("store lock poisoned: {}", e)))
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    fn bucket_name(&self) -> &str {
        &self.name
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.lock()?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}
