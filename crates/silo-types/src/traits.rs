//! Traits for warehouse and object-storage backends.

use crate::{
    DatasetId, JobHandle, JobStatus, QueryRequest, Row, SubmittedJob, TableInfo, TablePath,
    WriteDisposition,
};
use async_trait::async_trait;

/// Data-warehouse abstraction: datasets, tables, and asynchronous jobs.
///
/// Contract: `submit_*` start a remote job and return without waiting for it.
/// `job_status` performs exactly one status fetch; callers own the polling loop.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool, WarehouseError>;

    /// Create a dataset in the given location. With `exists_ok`, an
    /// already-existing dataset is not an error.
    async fn create_dataset(
        &self,
        dataset: &DatasetId,
        location: &str,
        exists_ok: bool,
    ) -> Result<(), WarehouseError>;

    /// Default expiration, in days, for tables created in the dataset.
    async fn set_dataset_expiry(
        &self,
        dataset: &DatasetId,
        num_days: u32,
    ) -> Result<(), WarehouseError>;

    async fn table_exists(&self, table: &TablePath) -> Result<bool, WarehouseError>;

    async fn table_info(&self, table: &TablePath) -> Result<TableInfo, WarehouseError>;

    /// Expire the table `num_days` from now.
    async fn set_table_expiry(&self, table: &TablePath, num_days: u32)
        -> Result<(), WarehouseError>;

    /// Start a query job. Dry runs complete immediately with a byte estimate.
    async fn submit_query(&self, req: &QueryRequest) -> Result<SubmittedJob, WarehouseError>;

    /// Start a load job writing JSON rows into the destination table.
    async fn submit_load(
        &self,
        rows: &[Row],
        destination: &TablePath,
        disposition: WriteDisposition,
    ) -> Result<JobHandle, WarehouseError>;

    /// Start an extract job exporting the table as CSV to the destination URI
    /// (e.g. `gs://bucket/file.csv`).
    async fn submit_extract(
        &self,
        table: &TablePath,
        destination_uri: &str,
    ) -> Result<JobHandle, WarehouseError>;

    /// Fetch the current status of a job. One observation per call.
    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, WarehouseError>;

    /// Result rows of a completed query job.
    async fn query_rows(&self, handle: &JobHandle) -> Result<Vec<Row>, WarehouseError>;
}

/// Object-storage abstraction over one bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn exists(&self, object: &str) -> Result<bool, BlobStoreError>;

    async fn upload(
        &self,
        object: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), BlobStoreError>;

    async fn download(&self, object: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Object names under the prefix; an empty prefix lists the whole bucket.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, BlobStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("warehouse error: {0}")]
    Other(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("decode error: {0}")]
    Decode(String),
}

#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("storage error: {0}")]
    Other(String),
    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("object not found: {0}")]
    NotFound(String),
}
