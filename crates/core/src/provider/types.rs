use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobKind, JobPayload};

/// Errors from vendor clients.
///
/// During polling every variant is treated as transient; the poller only
/// fails a job on a terminal [`TaskSnapshot`] or on timeout.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by provider: {0}")]
    Rejected(String),

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),

    #[error("provider {provider} does not handle {kind}")]
    UnsupportedKind { provider: String, kind: JobKind },
}

/// Vendor-side task state, normalized across vendors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Done,
    Failed,
    Expired,
    NotFound,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
            TaskStatus::Expired => "expired",
            TaskStatus::NotFound => "not_found",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    /// Vendor explanation for failed/expired tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Vendor estimate; replaced by the probed value when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl TaskSnapshot {
    pub fn pending() -> Self {
        Self::with_status(TaskStatus::Pending)
    }

    pub fn done(result_url: impl Into<String>) -> Self {
        Self {
            result_url: Some(result_url.into()),
            ..Self::with_status(TaskStatus::Done)
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            error_detail: Some(detail.into()),
            ..Self::with_status(TaskStatus::Failed)
        }
    }

    pub fn expired() -> Self {
        Self::with_status(TaskStatus::Expired)
    }

    pub fn not_found() -> Self {
        Self::with_status(TaskStatus::NotFound)
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    fn with_status(status: TaskStatus) -> Self {
        Self {
            status,
            result_url: None,
            error_detail: None,
            duration_secs: None,
        }
    }

    /// Non-blank result URL, if any.
    pub fn usable_result_url(&self) -> Option<&str> {
        self.result_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// A vendor backend able to run one or more job kinds.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Provider name used in configuration and job records.
    fn name(&self) -> &str;

    /// Whether this client can run `kind`.
    fn supports(&self, kind: JobKind) -> bool;

    /// Submit a task. Returns the vendor task id.
    async fn submit(
        &self,
        kind: JobKind,
        model: Option<&str>,
        payload: &JobPayload,
    ) -> Result<String, ProviderError>;

    /// Fetch the current state of a task.
    async fn query(&self, kind: JobKind, task_id: &str) -> Result<TaskSnapshot, ProviderError>;
}
