//! Object-storage pass-through.

use crate::OpsError;
use silo_types::BlobStore;
use std::sync::Arc;

/// One bucket, bound to a blob-store backend.
pub struct Bucket {
    store: Arc<dyn BlobStore>,
}

impl Bucket {
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    pub async fn exists(&self, object: &str) -> Result<bool, OpsError> {
        Ok(self.store.exists(object).await?)
    }

    pub async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), OpsError> {
        Ok(self.store.upload(object, bytes, content_type).await?)
    }

    pub async fn download(&self, object: &str) -> Result<Vec<u8>, OpsError> {
        Ok(self.store.download(object).await?)
    }

    /// Object names under the prefix; an empty prefix lists the whole bucket.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, OpsError> {
        Ok(self.store.list(prefix).await?)
    }
}
