//! Command execution against injected backends.

use crate::cli::{BlobOp, Cli, Command};
use crate::render::{self, Palette};
use chrono::Utc;
use rand::Rng;
use silo_ops::{
    Bucket, Dataset, LoadOptions, LoadOutcome, OpsError, Query, QueryOutcome, RowLoader,
    RowsOutcome, Table, ToTableOptions,
};
use silo_types::{BlobStore, DatasetId, Row, TablePath, Warehouse, WriteDisposition};
use silo_watch::{JobOutcome, WaitMode};
use std::sync::Arc;

/// Table the log-run row is appended to.
pub const RUN_LOG_TABLE: &str = "runner_logs";

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("{0}")]
    Ops(#[from] OpsError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Usage(String),
}

/// Run one parsed command. Returns the process exit code: zero unless a
/// watched job failed.
pub async fn dispatch<F>(
    cli: Cli,
    project: &str,
    warehouse: Arc<dyn Warehouse>,
    store_for: F,
    palette: &Palette,
) -> Result<i32, CliError>
where
    F: Fn(&str) -> Arc<dyn BlobStore>,
{
    let Cli {
        project: flag,
        command,
    } = cli;
    let project = flag.as_deref().unwrap_or(project);

    match command {
        Command::LogRun {
            dataset,
            var,
            location,
        } => {
            let project = require_project(project)?;
            log_run(warehouse, palette, project, &dataset, var, &location).await
        }
        Command::Query {
            sql,
            file,
            to,
            suffix,
            disposition,
            partition_field,
            cluster_by,
            dry_run,
            no_wait,
        } => {
            let sql = match (sql, file) {
                (Some(sql), _) => sql,
                (None, Some(path)) => std::fs::read_to_string(path)?,
                (None, None) => {
                    return Err(CliError::Usage(
                        "pass the SQL as an argument or with --file".to_string(),
                    ))
                }
            };
            let wait = if no_wait {
                WaitMode::Submit
            } else {
                WaitMode::Watch
            };
            match to {
                Some(spec) => {
                    let destination = parse_table(&spec, project)?;
                    let opts = ToTableOptions {
                        suffix,
                        disposition: disposition.into(),
                        partition_field,
                        clustering_fields: split_fields(cluster_by.as_deref()),
                        wait,
                        dry_run,
                    };
                    query_to_table(warehouse, palette, &sql, &destination, &opts).await
                }
                None if dry_run => {
                    query_execute(warehouse, palette, &sql, WaitMode::Watch, true).await
                }
                None if no_wait => {
                    query_execute(warehouse, palette, &sql, WaitMode::Submit, false).await
                }
                None => query_to_rows(warehouse, palette, &sql).await,
            }
        }
        Command::Extract {
            table,
            bucket,
            object,
        } => {
            let path = parse_table(&table, project)?;
            extract(warehouse, palette, path, &bucket, &object).await
        }
        Command::Blob { bucket, op } => blob(store_for(&bucket), &bucket, op).await,
    }
}

async fn log_run(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    project: &str,
    dataset: &str,
    var: i64,
    location: &str,
) -> Result<i32, CliError> {
    let id = DatasetId::new(project, dataset);
    Dataset::new(Arc::clone(&warehouse), id.clone())
        .create(location, true)
        .await?;
    render::dataset_created(&id);

    let mut row = Row::new();
    row.insert(
        "timestamp".to_string(),
        serde_json::json!(Utc::now().to_rfc3339()),
    );
    row.insert(
        "id".to_string(),
        serde_json::json!(rand::thread_rng().gen_range(1..=264_i64)),
    );
    row.insert("var".to_string(), serde_json::json!(var));

    let destination = TablePath::new(project, dataset, RUN_LOG_TABLE);
    let opts = LoadOptions {
        disposition: WriteDisposition::Append,
        ..Default::default()
    };
    load_rows(warehouse, palette, &[row], &destination, &opts).await
}

async fn load_rows(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    rows: &[Row],
    destination: &TablePath,
    opts: &LoadOptions,
) -> Result<i32, CliError> {
    let display = match opts.suffix.as_deref() {
        Some(s) => destination.clone().with_suffix(s),
        None => destination.clone(),
    };
    let loader = RowLoader::new(warehouse);
    let label = format!("> Loading {} row(s) into {}", rows.len(), display);
    let outcome = render::with_progress(&label, loader.to_table(rows, destination, opts)).await?;
    match outcome {
        LoadOutcome::Submitted(handle) => {
            render::no_wait(palette, &handle);
            Ok(0)
        }
        LoadOutcome::Finished(finished) => {
            render::outcome(palette, &finished.report.outcome);
            match finished.report.outcome {
                JobOutcome::Done(ref metadata) => {
                    render::metadata(palette, metadata);
                    if let Some(ref info) = finished.table {
                        render::loaded(info, &display);
                    }
                    Ok(0)
                }
                JobOutcome::Failed(_) => Ok(1),
            }
        }
    }
}

async fn query_to_table(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    sql: &str,
    destination: &TablePath,
    opts: &ToTableOptions,
) -> Result<i32, CliError> {
    let display = match opts.suffix.as_deref() {
        Some(s) => destination.clone().with_suffix(s),
        None => destination.clone(),
    };
    let query = Query::new(warehouse, sql);
    let label = format!("> Exporting query results to table {}", display);
    let outcome = render::with_progress(&label, query.to_table(destination, opts)).await?;
    report_query(palette, outcome)
}

async fn query_execute(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    sql: &str,
    wait: WaitMode,
    dry_run: bool,
) -> Result<i32, CliError> {
    let query = Query::new(warehouse, sql);
    let outcome = render::with_progress("> Running query", query.execute(wait, dry_run)).await?;
    report_query(palette, outcome)
}

async fn query_to_rows(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    sql: &str,
) -> Result<i32, CliError> {
    let query = Query::new(warehouse, sql);
    let outcome = render::with_progress("> Running query", query.to_rows()).await?;
    match outcome {
        RowsOutcome::Rows(rows) => {
            render::rows(rows);
            Ok(0)
        }
        RowsOutcome::Failed(errors) => {
            render::outcome(palette, &JobOutcome::Failed(errors));
            Ok(1)
        }
    }
}

fn report_query(palette: &Palette, outcome: QueryOutcome) -> Result<i32, CliError> {
    match outcome {
        QueryOutcome::Estimate {
            total_bytes_processed,
        } => {
            render::estimate(total_bytes_processed);
            Ok(0)
        }
        QueryOutcome::Submitted(handle) => {
            render::no_wait(palette, &handle);
            Ok(0)
        }
        QueryOutcome::Watched(report) => {
            render::outcome(palette, &report.outcome);
            match report.outcome {
                JobOutcome::Done(ref metadata) => {
                    render::metadata(palette, metadata);
                    Ok(0)
                }
                JobOutcome::Failed(_) => Ok(1),
            }
        }
    }
}

async fn extract(
    warehouse: Arc<dyn Warehouse>,
    palette: &Palette,
    path: TablePath,
    bucket: &str,
    object: &str,
) -> Result<i32, CliError> {
    let table = Table::new(warehouse, path);
    let label = format!("> Exporting table {} to storage", table.path());
    let report = render::with_progress(&label, table.to_storage(bucket, object)).await?;
    render::outcome(palette, &report.outcome);
    match report.outcome {
        JobOutcome::Done(ref metadata) => {
            render::metadata(palette, metadata);
            render::exported(table.path(), &format!("gs://{}/{}", bucket, object));
            Ok(0)
        }
        JobOutcome::Failed(_) => Ok(1),
    }
}

async fn blob(store: Arc<dyn BlobStore>, bucket_name: &str, op: BlobOp) -> Result<i32, CliError> {
    let bucket = Bucket::new(store);
    match op {
        BlobOp::Exists { object } => {
            println!("Checking {} in {}", object, bucket_name);
            println!("{}", bucket.exists(&object).await?);
        }
        BlobOp::List { prefix } => {
            for name in bucket.list(&prefix).await? {
                println!("{}", name);
            }
        }
        BlobOp::Upload {
            source,
            object,
            content_type,
        } => {
            let bytes = std::fs::read(&source)?;
            bucket.upload(&object, bytes, &content_type).await?;
            println!("File {} uploaded to {}.", source.display(), object);
        }
        BlobOp::Download {
            object,
            destination,
        } => {
            let bytes = bucket.download(&object).await?;
            std::fs::write(&destination, bytes)?;
            println!("Object {} downloaded to {}.", object, destination.display());
        }
    }
    Ok(0)
}

fn require_project(project: &str) -> Result<&str, CliError> {
    if project.is_empty() {
        return Err(CliError::Usage(
            "project is required: pass --project or set SILO_PROJECT".to_string(),
        ));
    }
    Ok(project)
}

fn parse_table(spec: &str, project: &str) -> Result<TablePath, CliError> {
    let parts: Vec<&str> = spec.split('.').collect();
    match parts.as_slice() {
        [dataset, table] => Ok(TablePath::new(require_project(project)?, dataset, table)),
        [project, dataset, table] => Ok(TablePath::new(project, dataset, table)),
        _ => Err(CliError::Usage(format!(
            "table must be `dataset.table` or `project.dataset.table`, got `{}`",
            spec
        ))),
    }
}

fn split_fields(spec: Option<&str>) -> Vec<String> {
    spec.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
