//! High-level operation flows against the in-memory backends.

use silo_ops::{
    Bucket, Dataset, LoadOptions, LoadOutcome, OpsError, Query, QueryOutcome, RowLoader,
    RowsOutcome, Table, ToTableOptions,
};
use silo_storage::InMemoryBlobStore;
use silo_types::{
    BlobStore, DatasetId, JobError, JobStatus, Row, TablePath, Warehouse, WarehouseError,
    WriteDisposition,
};
use silo_warehouse::{InMemoryWarehouse, StatusStep};
use silo_watch::{JobOutcome, WaitMode};
use std::sync::Arc;
use std::time::Duration;

const FAST_POLL: Duration = Duration::from_millis(2);

fn row(field: &str, value: i64) -> Row {
    let mut r = Row::new();
    r.insert(field.to_string(), serde_json::json!(value));
    r
}

fn job_error(message: &str) -> JobError {
    JobError {
        reason: "invalid".to_string(),
        message: message.to_string(),
        location: None,
    }
}

#[tokio::test]
async fn dataset_lifecycle() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let id = DatasetId::new("proj", "logs");
    let dataset = Dataset::new(wh.clone() as Arc<dyn Warehouse>, id.clone());

    assert!(!dataset.exists().await.unwrap());
    dataset.create("EU", true).await.unwrap();
    assert!(dataset.exists().await.unwrap());
    assert_eq!(wh.dataset_location(&id).await.as_deref(), Some("EU"));

    // Re-creating with exists_ok is a no-op, not a conflict.
    dataset.create("US", true).await.unwrap();
    assert_eq!(wh.dataset_location(&id).await.as_deref(), Some("EU"));

    dataset.set_expiry(30).await.unwrap();
    assert_eq!(wh.dataset_expiry_days(&id).await, Some(30));
}

#[tokio::test]
async fn load_watches_and_reports_table_shape() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let dest = TablePath::new("proj", "logs", "runner_logs");
    let loader = RowLoader::new(wh.clone() as Arc<dyn Warehouse>).with_poll_interval(FAST_POLL);
    let opts = LoadOptions {
        disposition: WriteDisposition::Append,
        ..Default::default()
    };

    let outcome = loader
        .to_table(&[row("id", 7), row("id", 8)], &dest, &opts)
        .await
        .unwrap();

    let finished = match outcome {
        LoadOutcome::Finished(f) => f,
        other => panic!("expected finished load, got {:?}", other),
    };
    assert!(finished.report.outcome.is_done());
    let info = finished.table.expect("completed load carries table info");
    assert_eq!(info.num_rows, 2);
    assert_eq!(info.num_columns, 1);
    assert_eq!(wh.table_rows(&dest).await.len(), 2);
}

#[tokio::test]
async fn load_suffix_lands_in_the_suffixed_table() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let dest = TablePath::new("proj", "logs", "events");
    let loader = RowLoader::new(wh.clone() as Arc<dyn Warehouse>).with_poll_interval(FAST_POLL);
    let opts = LoadOptions {
        suffix: Some("2021".to_string()),
        ..Default::default()
    };

    loader.to_table(&[row("id", 1)], &dest, &opts).await.unwrap();

    assert!(wh.table_rows(&dest).await.is_empty());
    let suffixed = dest.clone().with_suffix("2021");
    assert_eq!(wh.table_rows(&suffixed).await.len(), 1);
}

#[tokio::test]
async fn failed_load_reports_errors_and_no_table_info() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let dest = TablePath::new("proj", "logs", "events");
    wh.push_script(vec![StatusStep::Report(JobStatus::failed(vec![job_error(
        "schema mismatch",
    )]))])
    .await;
    let loader = RowLoader::new(wh.clone() as Arc<dyn Warehouse>).with_poll_interval(FAST_POLL);

    let outcome = loader
        .to_table(&[row("id", 1)], &dest, &LoadOptions::default())
        .await
        .unwrap();

    let finished = match outcome {
        LoadOutcome::Finished(f) => f,
        other => panic!("expected finished load, got {:?}", other),
    };
    match finished.report.outcome {
        JobOutcome::Failed(ref errors) => assert_eq!(errors[0].message, "schema mismatch"),
        ref other => panic!("expected failed outcome, got {:?}", other),
    }
    assert!(finished.table.is_none());
}

#[tokio::test]
async fn submit_mode_load_makes_no_status_fetches() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let dest = TablePath::new("proj", "logs", "events");
    let loader = RowLoader::new(wh.clone() as Arc<dyn Warehouse>);
    let opts = LoadOptions {
        wait: WaitMode::Submit,
        ..Default::default()
    };

    let outcome = loader.to_table(&[row("id", 1)], &dest, &opts).await.unwrap();

    let handle = match outcome {
        LoadOutcome::Submitted(h) => h,
        other => panic!("expected submitted load, got {:?}", other),
    };
    assert_eq!(wh.submission_count().await, 1);
    assert_eq!(wh.fetch_count(&handle).await, 0);
    // The handle is live: the job is still pollable by whoever picks it up.
    assert!(wh.job_status(&handle).await.is_ok());
}

#[tokio::test]
async fn query_submit_mode_makes_no_status_fetches() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let query = Query::new(wh.clone() as Arc<dyn Warehouse>, "SELECT 1");

    let outcome = query.execute(WaitMode::Submit, false).await.unwrap();

    let handle = match outcome {
        QueryOutcome::Submitted(h) => h,
        other => panic!("expected submitted query, got {:?}", other),
    };
    assert_eq!(wh.submission_count().await, 1);
    assert_eq!(wh.fetch_count(&handle).await, 0);
}

#[tokio::test]
async fn dry_run_reports_an_estimate_without_submitting() {
    let wh = Arc::new(InMemoryWarehouse::new());
    wh.set_dry_run_bytes(123_456).await;
    let query = Query::new(wh.clone() as Arc<dyn Warehouse>, "SELECT * FROM big");

    let outcome = query.execute(WaitMode::Watch, true).await.unwrap();

    assert_eq!(
        outcome,
        QueryOutcome::Estimate {
            total_bytes_processed: 123_456
        }
    );
    assert_eq!(wh.submission_count().await, 0);
}

#[tokio::test]
async fn watched_query_to_table_reports_completion() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let dest = TablePath::new("proj", "logs", "daily");
    let query = Query::new(wh.clone() as Arc<dyn Warehouse>, "SELECT day, n FROM src")
        .with_poll_interval(FAST_POLL);
    let opts = ToTableOptions {
        disposition: WriteDisposition::Truncate,
        partition_field: Some("day".to_string()),
        ..Default::default()
    };

    let outcome = query.to_table(&dest, &opts).await.unwrap();

    let report = match outcome {
        QueryOutcome::Watched(r) => r,
        other => panic!("expected watched query, got {:?}", other),
    };
    assert!(report.outcome.is_done());
    assert_eq!(wh.fetch_count(&report.handle).await, 1);
}

#[tokio::test]
async fn to_rows_returns_the_result_rows() {
    let wh = Arc::new(InMemoryWarehouse::new());
    wh.push_query_rows(vec![row("n", 1), row("n", 2)]).await;
    let query =
        Query::new(wh.clone() as Arc<dyn Warehouse>, "SELECT n FROM src").with_poll_interval(FAST_POLL);

    let outcome = query.to_rows().await.unwrap();

    assert_eq!(outcome, RowsOutcome::Rows(vec![row("n", 1), row("n", 2)]));
}

#[tokio::test]
async fn to_rows_surfaces_the_error_list_of_a_failed_query() {
    let wh = Arc::new(InMemoryWarehouse::new());
    wh.push_script(vec![StatusStep::Report(JobStatus::failed(vec![job_error(
        "Syntax error at [1:8]",
    )]))])
    .await;
    let query =
        Query::new(wh.clone() as Arc<dyn Warehouse>, "SELEC n FROM src").with_poll_interval(FAST_POLL);

    let outcome = query.to_rows().await.unwrap();

    match outcome {
        RowsOutcome::Failed(errors) => assert_eq!(errors[0].message, "Syntax error at [1:8]"),
        other => panic!("expected failed rows outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn table_export_watches_the_extract_job() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let path = TablePath::new("proj", "logs", "events");
    wh.submit_load(&[row("id", 1)], &path, WriteDisposition::Truncate)
        .await
        .unwrap();
    let table =
        Table::new(wh.clone() as Arc<dyn Warehouse>, path.clone()).with_poll_interval(FAST_POLL);

    assert!(table.exists().await.unwrap());
    let report = table.to_storage("exports", "events/2021/run.csv").await.unwrap();
    assert!(report.outcome.is_done());
}

#[tokio::test]
async fn exporting_a_missing_table_is_a_hard_error() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let table = Table::new(
        wh.clone() as Arc<dyn Warehouse>,
        TablePath::new("proj", "logs", "absent"),
    );

    let err = table.to_storage("exports", "absent.csv").await.unwrap_err();

    assert!(matches!(
        err,
        OpsError::Warehouse(WarehouseError::NotFound(_))
    ));
}

#[tokio::test]
async fn table_expiry_is_forwarded() {
    let wh = Arc::new(InMemoryWarehouse::new());
    let path = TablePath::new("proj", "logs", "events");
    wh.submit_load(&[row("id", 1)], &path, WriteDisposition::Truncate)
        .await
        .unwrap();
    let table = Table::new(wh.clone() as Arc<dyn Warehouse>, path.clone());

    table.set_expiry(14).await.unwrap();

    assert_eq!(wh.table_expiry_days(&path).await, Some(14));
}

#[tokio::test]
async fn bucket_passes_through_to_the_store() {
    let store = Arc::new(InMemoryBlobStore::new());
    let bucket = Bucket::new(store.clone() as Arc<dyn BlobStore>);

    assert!(!bucket.exists("reports/run.csv").await.unwrap());
    bucket
        .upload("reports/run.csv", b"a,b\n1,2\n".to_vec(), "text/csv")
        .await
        .unwrap();
    assert!(bucket.exists("reports/run.csv").await.unwrap());
    assert_eq!(bucket.download("reports/run.csv").await.unwrap(), b"a,b\n1,2\n");
    assert_eq!(
        bucket.list("reports/").await.unwrap(),
        vec!["reports/run.csv".to_string()]
    );
}
