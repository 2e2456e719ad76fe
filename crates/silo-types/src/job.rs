//! Job identity, state, and status observations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to a remote job. Owned by the service; clients only re-fetch state through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    pub project: String,
    pub id: String,
    /// Region the job runs in (e.g. "EU"). Required when fetching status.
    #[serde(default)]
    pub location: String,
}

impl JobHandle {
    pub fn new(project: &str, id: &str, location: &str) -> Self {
        Self {
            project: project.to_string(),
            id: id.to_string(),
            location: location.to_string(),
        }
    }
}

impl std::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Lifecycle state of a remote job. Transitions are monotonic and driven by the
/// service; clients only observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobState {
    /// Done and Failed are absorbing: once observed, no further transitions occur.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
            JobState::Done => "DONE",
            JobState::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only facts about a job, available once it is DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Email of the identity that submitted the job.
    pub user_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_billed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_bytes_processed: Option<i64>,
}

/// One structured error reported by the service for a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub reason: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reason.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.reason, self.message)
        }
    }
}

/// One status observation of a remote job, as returned by a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    /// Present when the job is DONE.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<JobMetadata>,
    /// Non-empty when the job is FAILED.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<JobError>,
}

impl JobStatus {
    pub fn pending() -> Self {
        Self {
            state: JobState::Pending,
            metadata: None,
            errors: Vec::new(),
        }
    }

    pub fn running() -> Self {
        Self {
            state: JobState::Running,
            metadata: None,
            errors: Vec::new(),
        }
    }

    pub fn done(metadata: JobMetadata) -> Self {
        Self {
            state: JobState::Done,
            metadata: Some(metadata),
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<JobError>) -> Self {
        Self {
            state: JobState::Failed,
            metadata: None,
            errors,
        }
    }
}

/// Outcome of submitting a query: a pollable job, or an immediate dry-run estimate.
///
/// Dry runs complete at submission and produce nothing to poll.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmittedJob {
    Started(JobHandle),
    DryRun { total_bytes_processed: i64 },
}
