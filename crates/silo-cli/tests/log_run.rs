//! End-to-end command flows against the in-memory backends.

use clap::Parser;
use silo_cli::cli::Cli;
use silo_cli::render::Palette;
use silo_cli::run::{self, CliError};
use silo_ops::OpsError;
use silo_storage::InMemoryBlobStore;
use silo_types::{
    BlobStore, DatasetId, JobError, JobStatus, TablePath, Warehouse, WarehouseError,
    WriteDisposition,
};
use silo_warehouse::{InMemoryWarehouse, StatusStep};
use std::sync::Arc;

fn job_error(message: &str) -> JobError {
    JobError {
        reason: "invalidQuery".to_string(),
        message: message.to_string(),
        location: None,
    }
}

fn row(field: &str, value: i64) -> silo_types::Row {
    let mut row = silo_types::Row::new();
    row.insert(field.to_string(), serde_json::json!(value));
    row
}

async fn run_cli(
    args: &[&str],
    warehouse: &Arc<InMemoryWarehouse>,
    store: &Arc<InMemoryBlobStore>,
) -> Result<i32, CliError> {
    let store = Arc::clone(store);
    run::dispatch(
        Cli::parse_from(args),
        "proj",
        Arc::clone(warehouse) as Arc<dyn Warehouse>,
        move |_bucket| Arc::clone(&store) as Arc<dyn BlobStore>,
        &Palette::plain(),
    )
    .await
}

#[tokio::test]
async fn log_run_appends_one_tagged_row() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());

    let code = run_cli(
        &["silo", "log-run", "--dataset", "logs", "--var", "7"],
        &warehouse,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    let dataset = DatasetId::new("proj", "logs");
    assert_eq!(
        warehouse.dataset_location(&dataset).await.as_deref(),
        Some("EU")
    );

    let rows = warehouse
        .table_rows(&TablePath::new("proj", "logs", run::RUN_LOG_TABLE))
        .await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].contains_key("timestamp"));
    assert_eq!(rows[0].get("var"), Some(&serde_json::json!(7)));
    let id = rows[0].get("id").and_then(|v| v.as_i64()).unwrap();
    assert!((1..=264).contains(&id));
    assert_eq!(warehouse.submission_count().await, 1);
}

#[tokio::test]
async fn log_run_appends_on_rerun() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    let args = ["silo", "log-run", "--dataset", "logs"];

    run_cli(&args, &warehouse, &store).await.unwrap();
    run_cli(&args, &warehouse, &store).await.unwrap();

    let rows = warehouse
        .table_rows(&TablePath::new("proj", "logs", run::RUN_LOG_TABLE))
        .await;
    assert_eq!(rows.len(), 2);
}

#[tokio::test]
async fn log_run_exits_nonzero_when_the_load_fails() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    warehouse
        .push_script(vec![StatusStep::Report(JobStatus::failed(vec![job_error(
            "quota exceeded",
        )]))])
        .await;

    let code = run_cli(
        &["silo", "log-run", "--dataset", "logs"],
        &warehouse,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(code, 1);
}

#[tokio::test]
async fn log_run_requires_a_project() {
    let warehouse = Arc::new(InMemoryWarehouse::new());

    let err = run::dispatch(
        Cli::parse_from(["silo", "log-run", "--dataset", "logs"]),
        "",
        Arc::clone(&warehouse) as Arc<dyn Warehouse>,
        |_bucket| Arc::new(InMemoryBlobStore::new()) as Arc<dyn BlobStore>,
        &Palette::plain(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CliError::Usage(_)));
    assert_eq!(warehouse.submission_count().await, 0);
}

#[tokio::test]
async fn query_dry_run_estimates_without_submitting() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    warehouse.set_dry_run_bytes(123_456).await;

    let code = run_cli(
        &["silo", "query", "SELECT * FROM big", "--dry-run"],
        &warehouse,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(warehouse.submission_count().await, 0);
}

#[tokio::test]
async fn query_prints_result_rows() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    warehouse.push_query_rows(vec![row("n", 1), row("n", 2)]).await;

    let code = run_cli(&["silo", "query", "SELECT n FROM t"], &warehouse, &store)
        .await
        .unwrap();

    assert_eq!(code, 0);
    assert_eq!(warehouse.submission_count().await, 1);
}

#[tokio::test]
async fn query_failure_exits_nonzero() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    warehouse
        .push_script(vec![StatusStep::Report(JobStatus::failed(vec![job_error(
            "syntax error at [1:8]",
        )]))])
        .await;

    let code = run_cli(&["silo", "query", "SELECT x FRM t"], &warehouse, &store)
        .await
        .unwrap();

    assert_eq!(code, 1);
}

#[tokio::test]
async fn query_no_wait_submits_without_watching() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());

    let code = run_cli(
        &[
            "silo", "query", "SELECT 1", "--to", "logs.daily", "--no-wait",
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
    assert_eq!(warehouse.submission_count().await, 1);
}

#[tokio::test]
async fn query_requires_sql_text_or_file() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());

    let err = run_cli(&["silo", "query"], &warehouse, &store)
        .await
        .unwrap_err();

    assert!(matches!(err, CliError::Usage(_)));
}

#[tokio::test]
async fn extract_exports_an_existing_table() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    let table = TablePath::new("proj", "logs", "events");
    let handle = warehouse
        .submit_load(&[row("n", 1)], &table, WriteDisposition::Truncate)
        .await
        .unwrap();
    warehouse.job_status(&handle).await.unwrap();

    let code = run_cli(
        &[
            "silo",
            "extract",
            "logs.events",
            "--bucket",
            "exports",
            "--object",
            "events.csv",
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap();

    assert_eq!(code, 0);
}

#[tokio::test]
async fn extract_of_a_missing_table_is_an_error() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());

    let err = run_cli(
        &[
            "silo",
            "extract",
            "logs.absent",
            "--bucket",
            "exports",
            "--object",
            "absent.csv",
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        CliError::Ops(OpsError::Warehouse(WarehouseError::NotFound(_)))
    ));
}

#[tokio::test]
async fn blob_upload_and_download_round_trip() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());

    let dir = std::env::temp_dir();
    let source = dir.join(format!("silo-blob-src-{}.csv", std::process::id()));
    let fetched = dir.join(format!("silo-blob-dst-{}.csv", std::process::id()));
    std::fs::write(&source, b"a,b\n1,2\n").unwrap();

    let code = run_cli(
        &[
            "silo",
            "blob",
            "--bucket",
            "exports",
            "upload",
            source.to_str().unwrap(),
            "reports/a.csv",
            "--content-type",
            "text/csv",
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);
    assert_eq!(
        store.content_type("reports/a.csv").await.as_deref(),
        Some("text/csv")
    );

    let code = run_cli(
        &[
            "silo",
            "blob",
            "--bucket",
            "exports",
            "download",
            "reports/a.csv",
            fetched.to_str().unwrap(),
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);
    assert_eq!(std::fs::read(&fetched).unwrap(), b"a,b\n1,2\n");

    std::fs::remove_file(&source).ok();
    std::fs::remove_file(&fetched).ok();
}

#[tokio::test]
async fn blob_exists_and_list_read_the_bucket() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let store = Arc::new(InMemoryBlobStore::new());
    store
        .upload("reports/a.csv", b"x".to_vec(), "text/csv")
        .await
        .unwrap();

    let code = run_cli(
        &[
            "silo", "blob", "--bucket", "exports", "exists", "reports/a.csv",
        ],
        &warehouse,
        &store,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);

    let code = run_cli(
        &["silo", "blob", "--bucket", "exports", "list", "reports/"],
        &warehouse,
        &store,
    )
    .await
    .unwrap();
    assert_eq!(code, 0);
}
