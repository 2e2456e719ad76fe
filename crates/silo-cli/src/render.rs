//! Console rendering for job reports. The core crates never print; this does.

use silo_types::{DatasetId, JobHandle, JobMetadata, Row, TableInfo, TablePath};
use silo_watch::{JobOutcome, DEFAULT_POLL_INTERVAL};
use std::future::Future;
use std::io::{self, IsTerminal, Write};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const MAGENTA: &str = "\x1b[35m";
const RESET: &str = "\x1b[0m";

/// ANSI palette, enabled only when stdout is a terminal.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    enabled: bool,
}

impl Palette {
    pub fn from_stdout() -> Self {
        Self {
            enabled: io::stdout().is_terminal(),
        }
    }

    pub fn plain() -> Self {
        Self { enabled: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.enabled {
            format!("{}{}{}", code, text, RESET)
        } else {
            text.to_string()
        }
    }
}

/// Drive `fut` to completion, printing a tick once per poll interval while it
/// runs. The label stays on one line with the ticks.
pub async fn with_progress<T>(label: &str, fut: impl Future<Output = T>) -> T {
    print!("{} ", label);
    let _ = io::stdout().flush();
    let mut ticker = tokio::time::interval(DEFAULT_POLL_INTERVAL);
    ticker.tick().await;
    tokio::pin!(fut);
    loop {
        tokio::select! {
            out = &mut fut => {
                println!();
                return out;
            }
            _ = ticker.tick() => {
                print!(">");
                let _ = io::stdout().flush();
            }
        }
    }
}

/// Success or failure banner, plus the error list of a failed job.
pub fn outcome(palette: &Palette, outcome: &JobOutcome) {
    match outcome {
        JobOutcome::Done(_) => println!("{}", palette.paint(GREEN, "> Query DONE (ಠ‿↼)")),
        JobOutcome::Failed(errors) => {
            println!("{}", palette.paint(RED, "> Query FAILED (ಠ_ಠ)"));
            for error in errors {
                println!("ERROR: {}", error.message);
            }
        }
    }
}

pub fn metadata(palette: &Palette, metadata: &JobMetadata) {
    println!(
        "{}",
        palette.paint(MAGENTA, &format!("> Email: {}", metadata.user_email))
    );
    if let Some(created) = metadata.created_at {
        println!("{}", palette.paint(MAGENTA, &format!("> Job time: {}", created)));
    }
    if let Some(billed) = metadata.total_bytes_billed {
        println!(
            "{}",
            palette.paint(MAGENTA, &format!("> Billed Bytes: {}", billed))
        );
    }
}

pub fn estimate(total_bytes_processed: i64) {
    println!(
        "> This query will process {} bytes.",
        total_bytes_processed
    );
}

/// Printed when a job is submitted fire-and-forget.
pub fn no_wait(palette: &Palette, handle: &JobHandle) {
    println!(
        "{}",
        palette.paint(
            RED,
            &format!("> Not watching job {}; its status will not be verified", handle)
        )
    );
}

/// Result rows as JSON lines.
pub fn rows(rows: Vec<Row>) {
    for row in rows {
        println!("{}", serde_json::Value::Object(row));
    }
}

pub fn dataset_created(id: &DatasetId) {
    println!("Created dataset {}", id);
}

pub fn loaded(info: &TableInfo, destination: &TablePath) {
    println!(
        "Loaded {} rows and {} columns to {}",
        info.num_rows, info.num_columns, destination
    );
}

pub fn exported(table: &TablePath, destination_uri: &str) {
    println!(
        "Exported {} to {}",
        table.render(silo_types::PathStyle::Legacy),
        destination_uri
    );
}
