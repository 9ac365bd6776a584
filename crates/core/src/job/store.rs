//! Job storage trait and types.

use std::fmt;

use crate::owner::OwnerRef;

use super::{JobCompletion, JobKind, JobPayload, JobRecord, JobStatus};

/// Error type for job store operations.
#[derive(Debug)]
pub enum JobError {
    /// Job not found (or soft-deleted).
    NotFound(String),
    /// Compare-and-set lost: the row is no longer in a state the write accepts.
    InvalidTransition {
        job_id: String,
        current: JobStatus,
        target: String,
    },
    /// Database error.
    Database(String),
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound(id) => write!(f, "Job not found: {}", id),
            JobError::InvalidTransition {
                job_id,
                current,
                target,
            } => write!(
                f,
                "Cannot move job {} to {}: current status is {}",
                job_id, target, current
            ),
            JobError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Request to create a new job in `pending`.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub kind: JobKind,
    pub provider: String,
    pub model: Option<String>,
    pub payload: JobPayload,
    pub owner: Option<OwnerRef>,
}

/// Filter for querying jobs. Soft-deleted rows never match.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub kind: Option<JobKind>,
    pub owner: Option<OwnerRef>,
    /// Maximum number of results.
    pub limit: i64,
    /// Offset for pagination.
    pub offset: i64,
}

impl JobFilter {
    /// Create a new filter with defaults.
    pub fn new() -> Self {
        Self {
            status: None,
            kind: None,
            owner: None,
            limit: 100,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_kind(mut self, kind: JobKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Set limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set offset.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// Trait for job storage backends.
///
/// Every `mark_*` method is a compare-and-set against the current status and
/// fails with [`JobError::InvalidTransition`] when another writer got there
/// first. Returned records reflect the row after the write.
pub trait JobStore: Send + Sync {
    /// Create a new job in `pending`.
    fn create(&self, request: CreateJobRequest) -> Result<JobRecord, JobError>;

    /// Get a job by ID. Soft-deleted jobs are returned as `None`.
    fn get(&self, id: &str) -> Result<Option<JobRecord>, JobError>;

    /// List jobs matching the filter, newest first.
    fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, JobError>;

    /// Count jobs matching the filter.
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError>;

    /// `pending` without a task id -> `processing` with `task_id`.
    fn mark_processing(&self, id: &str, task_id: &str) -> Result<JobRecord, JobError>;

    /// `pending | processing` -> `failed`.
    fn mark_failed(&self, id: &str, message: &str) -> Result<JobRecord, JobError>;

    /// `pending | processing` -> `cancelled`.
    fn mark_cancelled(&self, id: &str, reason: &str) -> Result<JobRecord, JobError>;

    /// `processing` -> `completed`.
    fn mark_completed(&self, id: &str, completion: &JobCompletion)
        -> Result<JobRecord, JobError>;

    /// Point a completed job at a different stable URL and clear `owner_synced`.
    fn rebind_stable_url(&self, id: &str, stable_url: &str) -> Result<JobRecord, JobError>;

    /// Record that the owner's media fields mirror `stable_url`.
    fn mark_owner_synced(&self, id: &str) -> Result<(), JobError>;

    /// Hide a job from reads, lists and recovery. The row is kept.
    fn soft_delete(&self, id: &str) -> Result<JobRecord, JobError>;

    /// `processing` jobs that carry a vendor task id.
    fn list_processing_with_task(&self) -> Result<Vec<JobRecord>, JobError>;

    /// `completed` jobs whose stable URL is empty or still the vendor URL.
    fn list_completed_missing_cache(&self) -> Result<Vec<JobRecord>, JobError>;

    /// `completed` jobs with a stable URL different from the vendor URL.
    fn list_completed_with_stable_url(&self) -> Result<Vec<JobRecord>, JobError>;

    /// `completed` jobs with an owner that has not been synced.
    fn list_completed_unsynced_owner(&self) -> Result<Vec<JobRecord>, JobError>;

    /// Whether any live job already uses `url` as its stable URL.
    fn stable_url_in_use(&self, url: &str) -> Result<bool, JobError>;
}
