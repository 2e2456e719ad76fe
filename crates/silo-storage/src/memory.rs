//! In-memory blob store for tests.

use silo_types::{BlobStore, BlobStoreError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

struct Blob {
    bytes: Vec<u8>,
    content_type: String,
}

/// In-memory BlobStore: objects in a map, listed in name order.
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Blob>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn content_type(&self, object: &str) -> Option<String> {
        let guard = self.objects.read().await;
        guard.get(object).map(|b| b.content_type.clone())
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn exists(&self, object: &str) -> Result<bool, BlobStoreError> {
        let guard = self.objects.read().await;
        Ok(guard.contains_key(object))
    }

    async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError> {
        let mut guard = self.objects.write().await;
        guard.insert(
            object.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(&self, object: &str) -> Result<Vec<u8>, BlobStoreError> {
        let guard = self.objects.read().await;
        guard
            .get(object)
            .map(|b| b.bytes.clone())
            .ok_or_else(|| BlobStoreError::NotFound(object.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError> {
        let guard = self.objects.read().await;
        let mut names: Vec<String> = guard
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        Ok(names)
    }
}
