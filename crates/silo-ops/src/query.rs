//! Query execution: dry runs, destination tables, result rows.

use crate::OpsError;
use silo_types::{
    JobError, JobHandle, QueryRequest, Row, SubmittedJob, TablePath, Warehouse, WarehouseError,
    WriteDisposition,
};
use silo_watch::{JobOutcome, JobWatcher, WaitMode, WatchReport};
use std::sync::Arc;
use std::time::Duration;

/// Options for `Query::to_table`.
#[derive(Debug, Clone, Default)]
pub struct ToTableOptions {
    /// Joined onto the table name (see `TablePath::with_suffix`).
    pub suffix: Option<String>,
    pub disposition: WriteDisposition,
    /// Day-partition the destination by this field.
    pub partition_field: Option<String>,
    pub clustering_fields: Vec<String>,
    pub wait: WaitMode,
    /// Estimate cost instead of running.
    pub dry_run: bool,
}

/// How a query submission ended.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Dry run: bytes the query would process. No job was started.
    Estimate { total_bytes_processed: i64 },
    /// Fire-and-forget: the job runs on, unwatched.
    Submitted(JobHandle),
    /// Watched to a terminal state.
    Watched(WatchReport),
}

/// Result rows of a watched query, or the error list if the job failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RowsOutcome {
    Rows(Vec<Row>),
    Failed(Vec<JobError>),
}

/// One SQL query, bound to a warehouse backend.
pub struct Query {
    warehouse: Arc<dyn Warehouse>,
    watcher: JobWatcher,
    sql: String,
}

impl Query {
    pub fn new(warehouse: Arc<dyn Warehouse>, sql: &str) -> Self {
        let watcher = JobWatcher::new(Arc::clone(&warehouse));
        Self {
            warehouse,
            watcher,
            sql: sql.to_string(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.watcher = self.watcher.with_poll_interval(interval);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Run the query without a destination table.
    pub async fn execute(&self, wait: WaitMode, dry_run: bool) -> Result<QueryOutcome, OpsError> {
        let mut req = QueryRequest::new(&self.sql);
        req.dry_run = dry_run;
        self.submit(&req, wait).await
    }

    /// Run the query writing its results into `destination`.
    pub async fn to_table(
        &self,
        destination: &TablePath,
        opts: &ToTableOptions,
    ) -> Result<QueryOutcome, OpsError> {
        let mut destination = destination.clone();
        if let Some(ref suffix) = opts.suffix {
            destination = destination.with_suffix(suffix);
        }
        let mut req = QueryRequest::new(&self.sql);
        req.destination = Some(destination);
        req.write_disposition = opts.disposition;
        req.partition_field = opts.partition_field.clone();
        req.clustering_fields = opts.clustering_fields.clone();
        req.dry_run = opts.dry_run;
        self.submit(&req, opts.wait).await
    }

    /// Run the query to completion and fetch its result rows.
    pub async fn to_rows(&self) -> Result<RowsOutcome, OpsError> {
        let req = QueryRequest::new(&self.sql);
        let handle = match self.warehouse.submit_query(&req).await? {
            SubmittedJob::Started(handle) => handle,
            SubmittedJob::DryRun { .. } => {
                return Err(OpsError::Warehouse(WarehouseError::Decode(
                    "dry-run response to a live query submission".to_string(),
                )))
            }
        };
        match self.watcher.await_completion(&handle).await? {
            JobOutcome::Done(_) => {
                let rows = self.warehouse.query_rows(&handle).await?;
                Ok(RowsOutcome::Rows(rows))
            }
            JobOutcome::Failed(errors) => Ok(RowsOutcome::Failed(errors)),
        }
    }

    async fn submit(&self, req: &QueryRequest, wait: WaitMode) -> Result<QueryOutcome, OpsError> {
        match self.warehouse.submit_query(req).await? {
            SubmittedJob::DryRun {
                total_bytes_processed,
            } => Ok(QueryOutcome::Estimate {
                total_bytes_processed,
            }),
            SubmittedJob::Started(handle) => match wait {
                WaitMode::Submit => Ok(QueryOutcome::Submitted(handle)),
                WaitMode::Watch => Ok(QueryOutcome::Watched(self.watcher.report(handle).await?)),
            },
        }
    }
}
