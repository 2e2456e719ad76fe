//! Watcher behavior against scripted jobs.

use silo_types::{JobError, JobMetadata, JobState, JobStatus, Warehouse, WarehouseError};
use silo_warehouse::{InMemoryWarehouse, StatusStep};
use silo_watch::{JobOutcome, JobWatcher, WatchError};
use std::sync::Arc;
use std::time::Duration;

fn metadata() -> JobMetadata {
    JobMetadata {
        user_email: "runner@example.com".to_string(),
        created_at: None,
        total_bytes_billed: Some(4096),
        total_bytes_processed: Some(1024),
    }
}

fn job_error(message: &str) -> JobError {
    JobError {
        reason: "invalidQuery".to_string(),
        message: message.to_string(),
        location: None,
    }
}

fn fast_watcher(warehouse: &Arc<InMemoryWarehouse>) -> JobWatcher {
    JobWatcher::new(Arc::clone(warehouse) as Arc<dyn Warehouse>)
        .with_poll_interval(Duration::from_millis(2))
}

#[tokio::test]
async fn polls_once_per_observation_until_done() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![
            StatusStep::Report(JobStatus::pending()),
            StatusStep::Report(JobStatus::pending()),
            StatusStep::Report(JobStatus::running()),
            StatusStep::Report(JobStatus::done(metadata())),
        ])
        .await;

    let outcome = fast_watcher(&warehouse)
        .await_completion(&handle)
        .await
        .unwrap();

    assert_eq!(outcome, JobOutcome::Done(metadata()));
    assert_eq!(warehouse.fetch_count(&handle).await, 4);
}

#[tokio::test]
async fn failed_job_is_an_outcome_not_an_error() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let errors = vec![job_error("Syntax error at [1:15]"), job_error("Job stopped")];
    let handle = warehouse
        .insert_job(vec![
            StatusStep::Report(JobStatus::running()),
            StatusStep::Report(JobStatus::failed(errors.clone())),
        ])
        .await;

    let outcome = fast_watcher(&warehouse)
        .await_completion(&handle)
        .await
        .unwrap();

    match outcome {
        JobOutcome::Failed(reported) => {
            let messages: Vec<&str> = reported.iter().map(|e| e.message.as_str()).collect();
            assert_eq!(messages, vec!["Syntax error at [1:15]", "Job stopped"]);
        }
        other => panic!("expected failed outcome, got {:?}", other),
    }
    assert_eq!(warehouse.fetch_count(&handle).await, 2);
}

#[tokio::test]
async fn pending_job_can_fail_without_running() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![
            StatusStep::Report(JobStatus::pending()),
            StatusStep::Report(JobStatus::failed(vec![job_error("quota exceeded")])),
        ])
        .await;

    let outcome = fast_watcher(&warehouse)
        .await_completion(&handle)
        .await
        .unwrap();

    assert!(matches!(outcome, JobOutcome::Failed(ref e) if e.len() == 1));
}

#[tokio::test]
async fn watching_a_finished_job_twice_yields_the_same_metadata() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![StatusStep::Report(JobStatus::done(metadata()))])
        .await;
    let watcher = fast_watcher(&warehouse);

    let first = watcher.await_completion(&handle).await.unwrap();
    let second = watcher.await_completion(&handle).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first, JobOutcome::Done(metadata()));
    // One fetch per call: a terminal job is observed, never re-polled.
    assert_eq!(warehouse.fetch_count(&handle).await, 2);
}

#[tokio::test]
async fn transport_error_propagates_and_halts_polling() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![
            StatusStep::Report(JobStatus::running()),
            StatusStep::Fail("connection reset by peer".to_string()),
            StatusStep::Report(JobStatus::done(metadata())),
        ])
        .await;

    let err = fast_watcher(&warehouse)
        .await_completion(&handle)
        .await
        .unwrap_err();

    match err {
        WatchError::Warehouse(WarehouseError::Other(message)) => {
            assert!(message.contains("connection reset"));
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    assert_eq!(warehouse.fetch_count(&handle).await, 2);
}

#[tokio::test]
async fn done_without_metadata_is_surfaced_distinctly() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![StatusStep::Report(JobStatus {
            state: JobState::Done,
            metadata: None,
            errors: Vec::new(),
        })])
        .await;

    let err = fast_watcher(&warehouse)
        .await_completion(&handle)
        .await
        .unwrap_err();

    assert!(matches!(err, WatchError::MissingMetadata(ref id) if *id == handle.id));
}

#[tokio::test]
async fn report_pairs_outcome_with_handle() {
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let handle = warehouse
        .insert_job(vec![StatusStep::Report(JobStatus::done(metadata()))])
        .await;

    let report = fast_watcher(&warehouse).report(handle.clone()).await.unwrap();

    assert_eq!(report.handle, handle);
    assert!(report.outcome.is_done());
}
