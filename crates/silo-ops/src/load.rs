//! Row loads with post-load table inspection.

use crate::OpsError;
use silo_types::{JobHandle, Row, TableInfo, TablePath, Warehouse, WriteDisposition};
use silo_watch::{JobWatcher, WaitMode, WatchReport};
use std::sync::Arc;
use std::time::Duration;

/// Options for `RowLoader::to_table`.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Joined onto the table name (see `TablePath::with_suffix`).
    pub suffix: Option<String>,
    pub disposition: WriteDisposition,
    pub wait: WaitMode,
}

/// How a load ended.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Fire-and-forget: the job runs on, unwatched.
    Submitted(JobHandle),
    /// Watched to a terminal state.
    Finished(LoadReport),
}

/// A watched load: the job report plus the landed table's shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub report: WatchReport,
    /// Present when the load completed; no info is fetched for a failed job.
    pub table: Option<TableInfo>,
}

/// Loads JSON rows into tables, bound to a warehouse backend.
pub struct RowLoader {
    warehouse: Arc<dyn Warehouse>,
    watcher: JobWatcher,
}

impl RowLoader {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        let watcher = JobWatcher::new(Arc::clone(&warehouse));
        Self { warehouse, watcher }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.watcher = self.watcher.with_poll_interval(interval);
        self
    }

    /// Load `rows` into `destination` and, when watching, report the landed
    /// table's shape. An info fetch that fails after a completed load is an
    /// error, not a blank report.
    pub async fn to_table(
        &self,
        rows: &[Row],
        destination: &TablePath,
        opts: &LoadOptions,
    ) -> Result<LoadOutcome, OpsError> {
        let mut destination = destination.clone();
        if let Some(ref suffix) = opts.suffix {
            destination = destination.with_suffix(suffix);
        }
        let handle = self
            .warehouse
            .submit_load(rows, &destination, opts.disposition)
            .await?;
        if opts.wait == WaitMode::Submit {
            return Ok(LoadOutcome::Submitted(handle));
        }
        let report = self.watcher.report(handle).await?;
        let table = if report.outcome.is_done() {
            Some(self.warehouse.table_info(&destination).await?)
        } else {
            None
        };
        Ok(LoadOutcome::Finished(LoadReport { report, table }))
    }
}
