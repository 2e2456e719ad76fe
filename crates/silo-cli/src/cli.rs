use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use silo_types::WriteDisposition;

#[derive(Parser)]
#[command(name = "silo")]
#[command(about = "Warehouse runner: datasets, queries, row loads, and storage transfer.")]
pub struct Cli {
    /// Project id (or SILO_PROJECT).
    #[arg(short, long, global = true)]
    pub project: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DispositionArg {
    /// Replace the destination table.
    Truncate,
    /// Append to the destination table.
    Append,
    /// Fail unless the destination table is empty.
    Empty,
}

impl From<DispositionArg> for WriteDisposition {
    fn from(arg: DispositionArg) -> Self {
        match arg {
            DispositionArg::Truncate => WriteDisposition::Truncate,
            DispositionArg::Append => WriteDisposition::Append,
            DispositionArg::Empty => WriteDisposition::Empty,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Append one tagged row to the runner log table and watch the load.
    LogRun {
        /// Name of the output dataset.
        #[arg(short, long)]
        dataset: String,

        /// Any integer to be reflected in the output row.
        #[arg(short, long, default_value_t = 0)]
        var: i64,

        /// Location the dataset is created in when missing.
        #[arg(long, default_value = "EU")]
        location: String,
    },
    /// Run a SQL query: estimate costs, fill a table, or print rows.
    Query {
        /// SQL text. Use --file to read it from a file instead.
        #[arg(conflicts_with = "file")]
        sql: Option<String>,

        /// Read the SQL from this file.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Destination table (`dataset.table` or `project.dataset.table`).
        /// Without it, result rows are printed as JSON lines.
        #[arg(long)]
        to: Option<String>,

        /// Suffix joined onto the destination table name.
        #[arg(long)]
        suffix: Option<String>,

        /// How to write into an existing destination.
        #[arg(long, value_enum, default_value_t = DispositionArg::Truncate)]
        disposition: DispositionArg,

        /// Day-partition the destination by this field.
        #[arg(long)]
        partition_field: Option<String>,

        /// Clustering fields for the destination (comma-separated).
        #[arg(long)]
        cluster_by: Option<String>,

        /// Estimate processed bytes instead of running.
        #[arg(long)]
        dry_run: bool,

        /// Submit the job without watching it.
        #[arg(long)]
        no_wait: bool,
    },
    /// Export a table as CSV to object storage.
    Extract {
        /// Source table (`dataset.table` or `project.dataset.table`).
        table: String,

        /// Destination bucket.
        #[arg(long)]
        bucket: String,

        /// Destination object name (e.g. exports/run.csv).
        #[arg(long)]
        object: String,
    },
    /// Object-store operations on one bucket.
    Blob {
        /// Bucket the operation runs against.
        #[arg(long)]
        bucket: String,

        #[command(subcommand)]
        op: BlobOp,
    },
}

#[derive(Subcommand)]
pub enum BlobOp {
    /// Check whether an object exists.
    Exists { object: String },
    /// List object names under a prefix.
    List {
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Upload a local file to the bucket.
    Upload {
        source: PathBuf,
        object: String,

        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },
    /// Download an object to a local file.
    Download { object: String, destination: PathBuf },
}
