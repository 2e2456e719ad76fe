//! Dataset-level operations.

use crate::OpsError;
use silo_types::{DatasetId, Warehouse};
use std::sync::Arc;

/// One dataset, bound to a warehouse backend.
pub struct Dataset {
    warehouse: Arc<dyn Warehouse>,
    id: DatasetId,
}

impl Dataset {
    pub fn new(warehouse: Arc<dyn Warehouse>, id: DatasetId) -> Self {
        Self { warehouse, id }
    }

    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    pub async fn exists(&self) -> Result<bool, OpsError> {
        Ok(self.warehouse.dataset_exists(&self.id).await?)
    }

    /// Create the dataset in `location`. With `exists_ok`, an existing dataset
    /// is left as it is.
    pub async fn create(&self, location: &str, exists_ok: bool) -> Result<(), OpsError> {
        Ok(self
            .warehouse
            .create_dataset(&self.id, location, exists_ok)
            .await?)
    }

    /// Default expiration, in days, for tables created in this dataset.
    pub async fn set_expiry(&self, num_days: u32) -> Result<(), OpsError> {
        Ok(self.warehouse.set_dataset_expiry(&self.id, num_days).await?)
    }
}
