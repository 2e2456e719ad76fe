//! HTTP client for a BigQuery v2 compatible REST API.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use silo_types::{
    DatasetId, JobError, JobHandle, JobMetadata, JobState, JobStatus, QueryRequest, Row,
    SubmittedJob, TableInfo, TablePath, Warehouse, WarehouseError, WriteDisposition,
};

const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
const RESULT_PAGE_SIZE: u32 = 10_000;
const UPLOAD_BOUNDARY: &str = "silo_media_boundary";

/// Connection settings for the warehouse API.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Project jobs are submitted (and billed) to.
    pub project: String,
    pub base_url: String,
    pub token: Option<String>,
}

impl WarehouseConfig {
    pub fn new(project: &str, base_url: &str, token: Option<String>) -> Self {
        Self {
            project: project.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Reads `SILO_PROJECT`, `SILO_WAREHOUSE_URL`, and `SILO_TOKEN`. The URL may
    /// point at the real service or an emulator.
    pub fn from_env() -> Self {
        let project = std::env::var("SILO_PROJECT").unwrap_or_default();
        let base_url =
            std::env::var("SILO_WAREHOUSE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let token = std::env::var("SILO_TOKEN").ok();
        Self::new(&project, &base_url, token)
    }
}

/// Warehouse backed by a BigQuery-compatible REST endpoint.
pub struct RestWarehouse {
    client: reqwest::Client,
    config: WarehouseConfig,
}

impl RestWarehouse {
    pub fn new(config: WarehouseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub fn from_env() -> Self {
        Self::new(WarehouseConfig::from_env())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    fn dataset_url(&self, dataset: &DatasetId) -> String {
        self.url(&format!(
            "projects/{}/datasets/{}",
            dataset.project, dataset.dataset
        ))
    }

    fn table_url(&self, table: &TablePath) -> String {
        self.url(&format!(
            "projects/{}/datasets/{}/tables/{}",
            table.project,
            table.dataset,
            table.table_name()
        ))
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(reqwest::StatusCode, String), WarehouseError> {
        let req = match &self.config.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };
        let res = req
            .send()
            .await
            .map_err(|e| WarehouseError::Other(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| WarehouseError::Other(e.to_string()))?;
        Ok((status, body))
    }

    async fn insert_job(&self, configuration: JobConfiguration) -> Result<JobResource, WarehouseError> {
        let url = self.url(&format!("projects/{}/jobs", self.config.project));
        let body = JobInsert { configuration };
        let (status, text) = self.send(self.client.post(&url).json(&body)).await?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| WarehouseError::Decode(e.to_string()))
    }

    async fn fetch_job(&self, handle: &JobHandle) -> Result<JobResource, WarehouseError> {
        let url = self.url(&format!("projects/{}/jobs/{}", handle.project, handle.id));
        let mut req = self.client.get(&url);
        if !handle.location.is_empty() {
            req = req.query(&[("location", handle.location.as_str())]);
        }
        let (status, text) = self.send(req).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(format!("job {}", handle.id)));
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        serde_json::from_str(&text).map_err(|e| WarehouseError::Decode(e.to_string()))
    }
}

#[async_trait::async_trait]
impl Warehouse for RestWarehouse {
    async fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool, WarehouseError> {
        let (status, text) = self.send(self.client.get(self.dataset_url(dataset))).await?;
        match status {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(api_error(s, &text)),
        }
    }

    async fn create_dataset(
        &self,
        dataset: &DatasetId,
        location: &str,
        exists_ok: bool,
    ) -> Result<(), WarehouseError> {
        let url = self.url(&format!("projects/{}/datasets", dataset.project));
        let body = DatasetResource {
            dataset_reference: DatasetReference {
                project_id: dataset.project.clone(),
                dataset_id: dataset.dataset.clone(),
            },
            location: Some(location.to_string()),
        };
        let (status, text) = self.send(self.client.post(&url).json(&body)).await?;
        if status == reqwest::StatusCode::CONFLICT && exists_ok {
            tracing::debug!(dataset = %dataset, "dataset already exists");
            return Ok(());
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        tracing::info!(dataset = %dataset, location, "created dataset");
        Ok(())
    }

    async fn set_dataset_expiry(
        &self,
        dataset: &DatasetId,
        num_days: u32,
    ) -> Result<(), WarehouseError> {
        let ms = num_days as i64 * 24 * 3600 * 1000;
        let body = DatasetExpiryPatch {
            default_table_expiration_ms: ms.to_string(),
        };
        let (status, text) = self
            .send(self.client.patch(self.dataset_url(dataset)).json(&body))
            .await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(dataset.to_string()));
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        tracing::info!(dataset = %dataset, expiration_ms = ms, "updated dataset expiration");
        Ok(())
    }

    async fn table_exists(&self, table: &TablePath) -> Result<bool, WarehouseError> {
        let (status, text) = self.send(self.client.get(self.table_url(table))).await?;
        match status {
            s if s.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            s => Err(api_error(s, &text)),
        }
    }

    async fn table_info(&self, table: &TablePath) -> Result<TableInfo, WarehouseError> {
        let (status, text) = self.send(self.client.get(self.table_url(table))).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(table.to_string()));
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        let resource: TableResource =
            serde_json::from_str(&text).map_err(|e| WarehouseError::Decode(e.to_string()))?;
        Ok(decode_table_info(&resource))
    }

    async fn set_table_expiry(
        &self,
        table: &TablePath,
        num_days: u32,
    ) -> Result<(), WarehouseError> {
        let expires = Utc::now() + chrono::Duration::days(num_days as i64);
        let body = TableExpiryPatch {
            expiration_time: expires.timestamp_millis().to_string(),
        };
        let (status, text) = self
            .send(self.client.patch(self.table_url(table)).json(&body))
            .await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(table.to_string()));
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        tracing::info!(table = %table, expires = %expires, "updated table expiration");
        Ok(())
    }

    async fn submit_query(&self, req: &QueryRequest) -> Result<SubmittedJob, WarehouseError> {
        let configuration = JobConfiguration {
            query: Some(QueryConfig::from_request(req)),
            extract: None,
            load: None,
            dry_run: req.dry_run,
        };
        let job = self.insert_job(configuration).await?;
        if req.dry_run {
            let bytes = job
                .statistics
                .as_ref()
                .and_then(JobStatistics::bytes_processed)
                .ok_or_else(|| {
                    WarehouseError::Decode("dry run response missing totalBytesProcessed".into())
                })?;
            return Ok(SubmittedJob::DryRun {
                total_bytes_processed: bytes,
            });
        }
        let handle = decode_handle(&job)?;
        tracing::info!(job = %handle, "submitted query job");
        Ok(SubmittedJob::Started(handle))
    }

    async fn submit_load(
        &self,
        rows: &[Row],
        destination: &TablePath,
        disposition: WriteDisposition,
    ) -> Result<JobHandle, WarehouseError> {
        let insert = JobInsert {
            configuration: JobConfiguration {
                query: None,
                extract: None,
                load: Some(LoadConfig {
                    destination_table: TableReference::from_path(destination),
                    source_format: "NEWLINE_DELIMITED_JSON".to_string(),
                    write_disposition: disposition.as_str().to_string(),
                    autodetect: true,
                }),
                dry_run: false,
            },
        };
        let mut ndjson = String::new();
        for row in rows {
            let line = serde_json::to_string(row)
                .map_err(|e| WarehouseError::Other(format!("row encode: {}", e)))?;
            ndjson.push_str(&line);
            ndjson.push('\n');
        }
        let body = multipart_related(&insert, &ndjson)
            .map_err(|e| WarehouseError::Other(format!("job encode: {}", e)))?;
        let url = self.url(&format!("projects/{}/jobs", self.config.project));
        let req = self
            .client
            .post(&url)
            .query(&[("uploadType", "multipart")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
            )
            .body(body);
        let (status, text) = self.send(req).await?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        let job: JobResource =
            serde_json::from_str(&text).map_err(|e| WarehouseError::Decode(e.to_string()))?;
        let handle = decode_handle(&job)?;
        tracing::info!(job = %handle, table = %destination, rows = rows.len(), "submitted load job");
        Ok(handle)
    }

    async fn submit_extract(
        &self,
        table: &TablePath,
        destination_uri: &str,
    ) -> Result<JobHandle, WarehouseError> {
        let configuration = JobConfiguration {
            query: None,
            extract: Some(ExtractConfig {
                source_table: TableReference::from_path(table),
                destination_uris: vec![destination_uri.to_string()],
                destination_format: "CSV".to_string(),
            }),
            load: None,
            dry_run: false,
        };
        let job = self.insert_job(configuration).await?;
        let handle = decode_handle(&job)?;
        tracing::info!(job = %handle, table = %table, uri = destination_uri, "submitted extract job");
        Ok(handle)
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<JobStatus, WarehouseError> {
        let job = self.fetch_job(handle).await?;
        decode_status(&job)
    }

    async fn query_rows(&self, handle: &JobHandle) -> Result<Vec<Row>, WarehouseError> {
        let url = self.url(&format!("projects/{}/queries/{}", handle.project, handle.id));
        let mut req = self
            .client
            .get(&url)
            .query(&[("maxResults", RESULT_PAGE_SIZE.to_string())]);
        if !handle.location.is_empty() {
            req = req.query(&[("location", handle.location.as_str())]);
        }
        let (status, text) = self.send(req).await?;
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WarehouseError::NotFound(format!("job {}", handle.id)));
        }
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        let response: QueryResultsResponse =
            serde_json::from_str(&text).map_err(|e| WarehouseError::Decode(e.to_string()))?;
        if !response.job_complete.unwrap_or(true) {
            return Err(WarehouseError::Other(format!(
                "query job {} has no results yet",
                handle.id
            )));
        }
        Ok(decode_result_rows(&response))
    }
}

// ---- wire types ----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetResource {
    dataset_reference: DatasetReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetReference {
    project_id: String,
    dataset_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DatasetExpiryPatch {
    default_table_expiration_ms: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableExpiryPatch {
    expiration_time: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TableResource {
    #[serde(default)]
    num_rows: Option<String>,
    #[serde(default)]
    schema: Option<TableSchema>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct SchemaField {
    name: String,
    #[serde(rename = "type", default)]
    field_type: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobInsert {
    configuration: JobConfiguration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JobConfiguration {
    #[serde(skip_serializing_if = "Option::is_none")]
    query: Option<QueryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extract: Option<ExtractConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load: Option<LoadConfig>,
    #[serde(skip_serializing_if = "is_false")]
    dry_run: bool,
}

fn is_false(v: &bool) -> bool {
    !v
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryConfig {
    query: String,
    use_legacy_sql: bool,
    use_query_cache: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    destination_table: Option<TableReference>,
    #[serde(skip_serializing_if = "Option::is_none")]
    write_disposition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_partitioning: Option<TimePartitioning>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clustering: Option<Clustering>,
}

impl QueryConfig {
    fn from_request(req: &QueryRequest) -> Self {
        Self {
            query: req.sql.clone(),
            use_legacy_sql: false,
            use_query_cache: req.use_cache,
            destination_table: req.destination.as_ref().map(TableReference::from_path),
            write_disposition: req
                .destination
                .as_ref()
                .map(|_| req.write_disposition.as_str().to_string()),
            time_partitioning: req.partition_field.as_ref().map(|field| TimePartitioning {
                kind: "DAY".to_string(),
                field: field.clone(),
            }),
            clustering: if req.clustering_fields.is_empty() {
                None
            } else {
                Some(Clustering {
                    fields: req.clustering_fields.clone(),
                })
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TableReference {
    project_id: String,
    dataset_id: String,
    table_id: String,
}

impl TableReference {
    fn from_path(path: &TablePath) -> Self {
        Self {
            project_id: path.project.clone(),
            dataset_id: path.dataset.clone(),
            table_id: path.table_name(),
        }
    }
}

#[derive(Serialize)]
struct TimePartitioning {
    #[serde(rename = "type")]
    kind: String,
    field: String,
}

#[derive(Serialize)]
struct Clustering {
    fields: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractConfig {
    source_table: TableReference,
    destination_uris: Vec<String>,
    destination_format: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoadConfig {
    destination_table: TableReference,
    source_format: String,
    write_disposition: String,
    autodetect: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobResource {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    status: Option<JobStatusResource>,
    #[serde(default)]
    statistics: Option<JobStatistics>,
    /// Snake case on the wire, unlike the rest of the resource.
    #[serde(default, rename = "user_email")]
    user_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResource {
    state: String,
    #[serde(default)]
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Int64 statistics come over the wire as decimal strings.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatistics {
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    query: Option<QueryStatistics>,
}

impl JobStatistics {
    fn bytes_processed(&self) -> Option<i64> {
        self.query
            .as_ref()
            .and_then(|q| q.total_bytes_processed.as_deref())
            .or(self.total_bytes_processed.as_deref())
            .and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryStatistics {
    #[serde(default)]
    total_bytes_billed: Option<String>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResultsResponse {
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<WireRow>,
    #[serde(default)]
    job_complete: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct WireRow {
    #[serde(default)]
    f: Vec<WireCell>,
}

#[derive(Debug, Deserialize)]
struct WireCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
}

// ---- decoding ----

fn api_error(status: reqwest::StatusCode, body: &str) -> WarehouseError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .map(|e| e.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    WarehouseError::Api {
        status: status.as_u16(),
        message,
    }
}

fn decode_handle(job: &JobResource) -> Result<JobHandle, WarehouseError> {
    let job_ref = job
        .job_reference
        .as_ref()
        .ok_or_else(|| WarehouseError::Decode("job response missing jobReference".into()))?;
    Ok(JobHandle::new(
        &job_ref.project_id,
        &job_ref.job_id,
        job_ref.location.as_deref().unwrap_or(""),
    ))
}

/// The wire only knows PENDING/RUNNING/DONE; DONE carrying an errorResult means
/// the job failed.
fn decode_status(job: &JobResource) -> Result<JobStatus, WarehouseError> {
    let status = job
        .status
        .as_ref()
        .ok_or_else(|| WarehouseError::Decode("job response missing status".into()))?;
    let state = match status.state.as_str() {
        "PENDING" => JobState::Pending,
        "RUNNING" => JobState::Running,
        "DONE" if status.error_result.is_some() => JobState::Failed,
        "DONE" => JobState::Done,
        other => {
            return Err(WarehouseError::Decode(format!(
                "unknown job state: {}",
                other
            )))
        }
    };
    let errors = if state == JobState::Failed {
        if status.errors.is_empty() {
            status
                .error_result
                .as_ref()
                .map(decode_error)
                .into_iter()
                .collect()
        } else {
            status.errors.iter().map(decode_error).collect()
        }
    } else {
        Vec::new()
    };
    let metadata = if state == JobState::Done {
        decode_metadata(job)
    } else {
        None
    };
    Ok(JobStatus {
        state,
        metadata,
        errors,
    })
}

fn decode_error(e: &ErrorProto) -> JobError {
    JobError {
        reason: e.reason.clone().unwrap_or_default(),
        message: e.message.clone().unwrap_or_default(),
        location: e.location.clone(),
    }
}

fn decode_metadata(job: &JobResource) -> Option<JobMetadata> {
    let user_email = job.user_email.clone()?;
    let stats = job.statistics.as_ref();
    Some(JobMetadata {
        user_email,
        created_at: stats
            .and_then(|s| s.creation_time.as_deref())
            .and_then(parse_epoch_millis),
        total_bytes_billed: stats
            .and_then(|s| s.query.as_ref())
            .and_then(|q| q.total_bytes_billed.as_deref())
            .and_then(|v| v.parse().ok()),
        total_bytes_processed: stats.and_then(JobStatistics::bytes_processed),
    })
}

fn parse_epoch_millis(s: &str) -> Option<DateTime<Utc>> {
    let ms = s.parse::<i64>().ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

fn decode_table_info(resource: &TableResource) -> TableInfo {
    TableInfo {
        num_rows: resource
            .num_rows
            .as_deref()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0),
        num_columns: resource
            .schema
            .as_ref()
            .map(|s| s.fields.len())
            .unwrap_or(0),
    }
}

/// Results rows come F/V encoded: one `{"f": [{"v": ...}, ..]}` object per row,
/// scalar values as strings. Decoded by position against the schema.
fn decode_result_rows(response: &QueryResultsResponse) -> Vec<Row> {
    let fields: &[SchemaField] = response
        .schema
        .as_ref()
        .map(|s| s.fields.as_slice())
        .unwrap_or(&[]);
    response
        .rows
        .iter()
        .map(|row| {
            let mut out = Row::new();
            for (field, cell) in fields.iter().zip(row.f.iter()) {
                out.insert(field.name.clone(), decode_cell(field, &cell.v));
            }
            out
        })
        .collect()
}

fn decode_cell(field: &SchemaField, value: &serde_json::Value) -> serde_json::Value {
    let text = match value {
        serde_json::Value::String(s) => s,
        other => return other.clone(),
    };
    match field.field_type.as_str() {
        "INTEGER" | "INT64" => text
            .parse::<i64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| value.clone()),
        "FLOAT" | "FLOAT64" => text
            .parse::<f64>()
            .map(serde_json::Value::from)
            .unwrap_or_else(|_| value.clone()),
        "BOOLEAN" | "BOOL" => match text.as_str() {
            "true" => serde_json::Value::Bool(true),
            "false" => serde_json::Value::Bool(false),
            _ => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Builds a `multipart/related` upload body: a JSON job configuration part
/// followed by the NDJSON media part.
fn multipart_related(job: &JobInsert, ndjson: &str) -> Result<String, serde_json::Error> {
    let config_json = serde_json::to_string(job)?;
    Ok(format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{config}\r\n--{b}\r\nContent-Type: application/octet-stream\r\n\r\n{data}\r\n--{b}--\r\n",
        b = UPLOAD_BOUNDARY,
        config = config_json,
        data = ndjson,
    ))
}
