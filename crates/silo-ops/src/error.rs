use silo_types::{BlobStoreError, WarehouseError};
use silo_watch::WatchError;

#[derive(Debug, thiserror::Error)]
pub enum OpsError {
    #[error("warehouse: {0}")]
    Warehouse(#[from] WarehouseError),
    #[error("storage: {0}")]
    Storage(#[from] BlobStoreError),
    #[error("watch: {0}")]
    Watch(#[from] WatchError),
}
