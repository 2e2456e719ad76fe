//! The poll loop: fetch status, sleep, re-fetch, stop on DONE or FAILED.

use silo_types::{JobError, JobHandle, JobMetadata, JobState, Warehouse, WarehouseError};
use std::sync::Arc;
use std::time::Duration;

/// How often status is re-fetched while a job is still in flight.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Whether a submission site waits for its job or hands back the handle right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitMode {
    /// Poll the job to completion.
    #[default]
    Watch,
    /// Fire and forget: one submission call, zero status fetches.
    Submit,
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("warehouse: {0}")]
    Warehouse(#[from] WarehouseError),
    /// The service reported DONE but withheld the metadata that comes with it.
    /// Surfaced distinctly instead of passing as a success with blanks.
    #[error("job {0} reported DONE without metadata")]
    MissingMetadata(String),
}

/// How a watched job ended. A failed job is a reported outcome, not an error:
/// `WatchError` is reserved for local invocation failures.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(JobMetadata),
    Failed(Vec<JobError>),
}

impl JobOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, JobOutcome::Done(_))
    }
}

/// A watched handle paired with how its job ended.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchReport {
    pub handle: JobHandle,
    pub outcome: JobOutcome,
}

/// Watches one job per call: fixed-interval polling, no backoff, no retry.
///
/// Contract: `await_completion` performs one status fetch per iteration and
/// returns exactly once, after the first observation of a terminal state.
/// Terminal states are absorbing, so re-watching a finished job is harmless
/// and yields the same outcome.
pub struct JobWatcher {
    warehouse: Arc<dyn Warehouse>,
    poll_interval: Duration,
}

impl JobWatcher {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Polls until the job reaches a terminal state and returns how it ended.
    ///
    /// Transport errors during a fetch propagate immediately and stop the
    /// poll; they are never swallowed or retried here.
    pub async fn await_completion(&self, handle: &JobHandle) -> Result<JobOutcome, WatchError> {
        loop {
            let status = self.warehouse.job_status(handle).await?;
            match status.state {
                JobState::Pending | JobState::Running => {
                    tracing::debug!(job = %handle, state = %status.state, "job in flight");
                    tokio::time::sleep(self.poll_interval).await;
                }
                JobState::Done => {
                    let metadata = status
                        .metadata
                        .ok_or_else(|| WatchError::MissingMetadata(handle.id.clone()))?;
                    tracing::info!(job = %handle, "job done");
                    return Ok(JobOutcome::Done(metadata));
                }
                JobState::Failed => {
                    tracing::info!(job = %handle, errors = status.errors.len(), "job failed");
                    return Ok(JobOutcome::Failed(status.errors));
                }
            }
        }
    }

    /// Watch the job and pair the outcome with its handle.
    pub async fn report(&self, handle: JobHandle) -> Result<WatchReport, WatchError> {
        let outcome = self.await_completion(&handle).await?;
        Ok(WatchReport { handle, outcome })
    }
}
