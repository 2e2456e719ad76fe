//! In-memory warehouse: map-backed datasets/tables and scripted job state, for tests.

use silo_types::{
    DatasetId, JobError, JobHandle, JobMetadata, JobStatus, QueryRequest, Row, SubmittedJob,
    TableInfo, TablePath, Warehouse, WarehouseError, WriteDisposition,
};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// One scripted step of a job: a status observation, or a transport failure.
#[derive(Debug, Clone)]
pub enum StatusStep {
    Report(JobStatus),
    Fail(String),
}

struct ScriptedJob {
    steps: Vec<StatusStep>,
    cursor: usize,
    fetches: usize,
}

impl ScriptedJob {
    fn new(steps: Vec<StatusStep>) -> Self {
        let steps = if steps.is_empty() {
            vec![StatusStep::Report(JobStatus::done(default_metadata()))]
        } else {
            steps
        };
        Self {
            steps,
            cursor: 0,
            fetches: 0,
        }
    }

    /// One fetch: report the current step, advance unless at the end. The last
    /// step repeats forever, so terminal states are absorbing.
    fn fetch(&mut self) -> StatusStep {
        self.fetches += 1;
        let step = self.steps[self.cursor].clone();
        if self.cursor + 1 < self.steps.len() {
            self.cursor += 1;
        }
        step
    }
}

struct DatasetEntry {
    location: String,
    expiry_days: Option<u32>,
}

struct TableEntry {
    rows: Vec<Row>,
    expiry_days: Option<u32>,
}

#[derive(Default)]
struct Inner {
    datasets: HashMap<String, DatasetEntry>,
    tables: HashMap<String, TableEntry>,
    jobs: HashMap<String, ScriptedJob>,
    /// FIFO of scripts consumed by future submissions.
    pending_scripts: Vec<Vec<StatusStep>>,
    /// FIFO of result sets consumed by future query submissions.
    pending_results: Vec<Vec<Row>>,
    dry_run_bytes: Option<i64>,
    submissions: usize,
    query_results: HashMap<String, Vec<Row>>,
}

fn default_metadata() -> JobMetadata {
    JobMetadata {
        user_email: "tester@example.com".to_string(),
        created_at: None,
        total_bytes_billed: Some(0),
        total_bytes_processed: Some(0),
    }
}

/// In-memory Warehouse. Datasets and tables live in maps; every submitted job
/// walks a scripted status sequence, one step per `job_status` call.
pub struct InMemoryWarehouse {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Metadata reported by jobs that were not given an explicit script.
    pub fn default_done_metadata() -> JobMetadata {
        default_metadata()
    }

    /// Register a job directly, without going through a submission. An empty
    /// script behaves as a single DONE report.
    pub async fn insert_job(&self, steps: Vec<StatusStep>) -> JobHandle {
        let mut guard = self.inner.write().await;
        guard.register_job(steps)
    }

    /// Queue a status script for the next submitted job (FIFO). Submissions
    /// without a queued script complete as DONE on the first fetch.
    pub async fn push_script(&self, steps: Vec<StatusStep>) {
        let mut guard = self.inner.write().await;
        guard.pending_scripts.push(steps);
    }

    /// Queue result rows for the next submitted query job (FIFO).
    pub async fn push_query_rows(&self, rows: Vec<Row>) {
        let mut guard = self.inner.write().await;
        guard.pending_results.push(rows);
    }

    /// Byte estimate reported by dry-run submissions. Defaults to the SQL length.
    pub async fn set_dry_run_bytes(&self, bytes: i64) {
        let mut guard = self.inner.write().await;
        guard.dry_run_bytes = Some(bytes);
    }

    /// Number of `job_status` fetches made for the job so far.
    pub async fn fetch_count(&self, handle: &JobHandle) -> usize {
        let guard = self.inner.read().await;
        guard.jobs.get(&handle.id).map(|j| j.fetches).unwrap_or(0)
    }

    /// Number of jobs submitted (query, load, and extract combined).
    pub async fn submission_count(&self) -> usize {
        let guard = self.inner.read().await;
        guard.submissions
    }

    pub async fn table_rows(&self, table: &TablePath) -> Vec<Row> {
        let guard = self.inner.read().await;
        guard
            .tables
            .get(&table.to_string())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn dataset_location(&self, dataset: &DatasetId) -> Option<String> {
        let guard = self.inner.read().await;
        guard
            .datasets
            .get(&dataset.to_string())
            .map(|d| d.location.clone())
    }

    pub async fn dataset_expiry_days(&self, dataset: &DatasetId) -> Option<u32> {
        let guard = self.inner.read().await;
        guard
            .datasets
            .get(&dataset.to_string())
            .and_then(|d| d.expiry_days)
    }

    pub async fn table_expiry_days(&self, table: &TablePath) -> Option<u32> {
        let guard = self.inner.read().await;
        guard
            .tables
            .get(&table.to_string())
            .and_then(|t| t.expiry_days)
    }
}

impl Default for InMemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn register_job(&mut self, steps: Vec<StatusStep>) -> JobHandle {
        let handle = JobHandle::new("local", &Uuid::new_v4().to_string(), "");
        self.jobs.insert(handle.id.clone(), ScriptedJob::new(steps));
        handle
    }

    fn next_script(&mut self) -> Vec<StatusStep> {
        if self.pending_scripts.is_empty() {
            Vec::new()
        } else {
            self.pending_scripts.remove(0)
        }
    }

    fn submit(&mut self, steps: Vec<StatusStep>) -> JobHandle {
        self.submissions += 1;
        self.register_job(steps)
    }
}

#[async_trait::async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool, WarehouseError> {
        let guard = self.inner.read().await;
        Ok(guard.datasets.contains_key(&dataset.to_string()))
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetId,
        location: &str,
        exists_ok: bool,
    ) -> Result<(), WarehouseError> {
        let mut guard = self.inner.write().await;
        let key = dataset.to_string();
        if guard.datasets.contains_key(&key) {
            if exists_ok {
                return Ok(());
            }
            return Err(WarehouseError::Api {
                status: 409,
                message: format!("Already Exists: Dataset {}", key),
            });
        }
        guard.datasets.insert(
            key,
            DatasetEntry {
                location: location.to_string(),
                expiry_days: None,
            },
        );
        Ok(())
    }

    async fn set_dataset_expiry(
        &self,
        dataset: &DatasetId,
        num_days: u32,
    ) -> Result<(), WarehouseError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .datasets
            .get_mut(&dataset.to_string())
            .ok_or_else(|| WarehouseError::NotFound(dataset.to_string()))?;
        entry.expiry_days = Some(num_days);
        Ok(())
    }

    async fn table_exists(&self, table: &TablePath) -> Result<bool, WarehouseError> {
        let guard = self.inner.read().await;
        Ok(guard.tables.contains_key(&table.to_string()))
    }

    async fn table_info(&self, table: &TablePath) -> Result<TableInfo, WarehouseError> {
        let guard = self.inner.read().await;
        let entry = guard
            .tables
            .get(&table.to_string())
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))?;
        let columns: BTreeSet<&str> = entry
            .rows
            .iter()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect();
        Ok(TableInfo {
            num_rows: entry.rows.len() as u64,
            num_columns: columns.len(),
        })
    }

    async fn set_table_expiry(
        &self,
        table: &TablePath,
        num_days: u32,
    ) -> Result<(), WarehouseError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .tables
            .get_mut(&table.to_string())
            .ok_or_else(|| WarehouseError::NotFound(table.to_string()))?;
        entry.expiry_days = Some(num_days);
        Ok(())
    }

    async fn submit_query(&self, req: &QueryRequest) -> Result<SubmittedJob, WarehouseError> {
        let mut guard = self.inner.write().await;
        if req.dry_run {
            let bytes = guard.dry_run_bytes.unwrap_or(req.sql.len() as i64);
            return Ok(SubmittedJob::DryRun {
                total_bytes_processed: bytes,
            });
        }
        let script = guard.next_script();
        let handle = guard.submit(script);
        if !guard.pending_results.is_empty() {
            let rows = guard.pending_results.remove(0);
            guard.query_results.insert(handle.id.clone(), rows);
        }
        Ok(SubmittedJob::Started(handle))
    }

    /// Applies the disposition to the stored rows at submission time. A
    /// `WRITE_EMPTY` load into a non-empty table turns into a failing job.
    async fn submit_load(
        &self,
        rows: &[Row],
        destination: &TablePath,
        disposition: WriteDisposition,
    ) -> Result<JobHandle, WarehouseError> {
        let mut guard = self.inner.write().await;
        let key = destination.to_string();
        let existing = guard.tables.entry(key).or_insert_with(|| TableEntry {
            rows: Vec::new(),
            expiry_days: None,
        });
        let not_empty = !existing.rows.is_empty();
        match disposition {
            WriteDisposition::Truncate => existing.rows = rows.to_vec(),
            WriteDisposition::Append => existing.rows.extend(rows.to_vec()),
            WriteDisposition::Empty if not_empty => {
                let steps = vec![StatusStep::Report(JobStatus::failed(vec![JobError {
                    reason: "duplicate".to_string(),
                    message: format!("table {} is not empty", destination),
                    location: None,
                }]))];
                return Ok(guard.submit(steps));
            }
            WriteDisposition::Empty => existing.rows.extend(rows.to_vec()),
        }
        let script = guard.next_script();
        Ok(guard.submit(script))
    }

    async fn submit_extract(
        &self,
        table: &TablePath,
        _destination_uri: &str,
    ) -> Result<JobHandle, WarehouseError> {
        let mut guard = self.inner.write().await;
        if !guard.tables.contains_key(&table.to_string()) {
            return Err(WarehouseError::NotFound(table.to_string()));
        }
        let script = guard.next_script();
        Ok(guard.submit(script))
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, WarehouseError> {
        let mut guard = self.inner.write().await;
        let job = guard
            .jobs
            .get_mut(&handle.id)
            .ok_or_else(|| WarehouseError::NotFound(format!("job {}", handle.id)))?;
        match job.fetch() {
            StatusStep::Report(status) => Ok(status),
            StatusStep::Fail(message) => Err(WarehouseError::Other(message)),
        }
    }

    async fn query_rows(&self, handle: &JobHandle) -> Result<Vec<Row>, WarehouseError> {
        let guard = self.inner.read().await;
        if !guard.jobs.contains_key(&handle.id) {
            return Err(WarehouseError::NotFound(format!("job {}", handle.id)));
        }
        Ok(guard
            .query_results
            .get(&handle.id)
            .cloned()
            .unwrap_or_default())
    }
}
