//! Table-level operations, including export to object storage.

use crate::OpsError;
use silo_types::{TableInfo, TablePath, Warehouse};
use silo_watch::{JobWatcher, WatchReport};
use std::sync::Arc;
use std::time::Duration;

/// One table, bound to a warehouse backend.
pub struct Table {
    warehouse: Arc<dyn Warehouse>,
    watcher: JobWatcher,
    path: TablePath,
}

impl Table {
    pub fn new(warehouse: Arc<dyn Warehouse>, path: TablePath) -> Self {
        let watcher = JobWatcher::new(Arc::clone(&warehouse));
        Self {
            warehouse,
            watcher,
            path,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.watcher = self.watcher.with_poll_interval(interval);
        self
    }

    pub fn path(&self) -> &TablePath {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool, OpsError> {
        Ok(self.warehouse.table_exists(&self.path).await?)
    }

    pub async fn info(&self) -> Result<TableInfo, OpsError> {
        Ok(self.warehouse.table_info(&self.path).await?)
    }

    /// Expire this table `num_days` from now.
    pub async fn set_expiry(&self, num_days: u32) -> Result<(), OpsError> {
        Ok(self.warehouse.set_table_expiry(&self.path, num_days).await?)
    }

    /// Export the table as CSV to `gs://bucket/object` and watch the extract
    /// job to completion.
    pub async fn to_storage(&self, bucket: &str, object: &str) -> Result<WatchReport, OpsError> {
        let uri = format!("gs://{}/{}", bucket, object);
        let handle = self.warehouse.submit_extract(&self.path, &uri).await?;
        Ok(self.watcher.report(handle).await?)
    }
}
