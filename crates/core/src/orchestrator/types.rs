//! Types for the job orchestrator.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::{JobError, JobKind, JobPayload, JobRecord, JobStatus, ValidationError};
use crate::owner::OwnerRef;

/// Errors returned to callers of the orchestrator.
///
/// Poller and completer failures never surface here; they end as job states.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Submission input rejected. No job was created.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No usable provider for the request. No job was created.
    #[error("no provider: {0}")]
    NoProvider(String),

    /// Poller capacity exhausted. No job was created.
    #[error("too many active jobs, try again later")]
    Saturated,

    #[error("job not found: {0}")]
    JobNotFound(String),

    /// Job already reached a terminal state.
    #[error("job {job_id} is already {status}")]
    AlreadyFinished { job_id: String, status: JobStatus },

    #[error("job store error: {0}")]
    Store(#[from] JobError),

    #[error("orchestrator is not running")]
    NotRunning,
}

/// Request to run one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub kind: JobKind,
    pub payload: JobPayload,
    #[serde(default)]
    pub owner: Option<OwnerRef>,
    /// Provider override; the configured default for `kind` is used when absent.
    #[serde(default)]
    pub provider: Option<String>,
}

impl SubmitRequest {
    /// Request whose kind is taken from the payload.
    pub fn new(payload: JobPayload) -> Self {
        Self {
            kind: payload.kind(),
            payload,
            owner: None,
            provider: None,
        }
    }

    pub fn with_owner(mut self, owner: OwnerRef) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Called after every persisted state change of a job.
pub type JobUpdateCallback = Arc<dyn Fn(&JobRecord) + Send + Sync>;

/// What one recovery sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Processing jobs that got a poller.
    pub reattached: usize,
    /// Processing jobs that already had a poller in this process.
    pub already_polling: usize,
    /// Jobs still pending, left untouched.
    pub stuck_pending: usize,
    /// Completed jobs re-cached from their vendor URL.
    pub redownloaded: usize,
    /// Completed jobs bound to an unclaimed cache file by timestamp.
    pub rebound: usize,
    /// Completed jobs without any usable cache copy.
    pub missed: usize,
    /// Owners whose media was rewritten.
    pub owners_resynced: usize,
}

impl RecoveryReport {
    /// Whether the sweep changed any job or owner.
    pub fn changed_anything(&self) -> bool {
        self.reattached + self.redownloaded + self.rebound + self.owners_resynced > 0
    }
}

/// Current status of the orchestrator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub running: bool,
    /// Pollers holding a running slot.
    pub active_pollers: usize,
    /// Admitted pollers waiting for a running slot.
    pub queued_pollers: usize,
    pub max_concurrent_pollers: usize,
    pub pending_count: usize,
    pub processing_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub cancelled_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TtsSynthesisParams;

    #[test]
    fn test_submit_request_takes_kind_from_payload() {
        let request = SubmitRequest::new(JobPayload::TtsSynthesis(TtsSynthesisParams::default()))
            .with_provider("volcengine");
        assert_eq!(request.kind, JobKind::TtsSynthesis);
        assert_eq!(request.provider.as_deref(), Some("volcengine"));
        assert!(request.owner.is_none());
    }

    #[test]
    fn test_submit_request_deserialize() {
        let json = r#"{
            "kind": "voice_clone",
            "payload": {"kind": "voice_clone", "params": {"audio_url": "https://cdn/ref.wav"}},
            "owner": {"kind": "custom_voice", "id": "17"}
        }"#;
        let request: SubmitRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.kind, JobKind::VoiceClone);
        assert_eq!(request.owner.unwrap().id, "17");
    }

    #[test]
    fn test_orchestrator_status_default() {
        let status = OrchestratorStatus::default();
        assert!(!status.running);
        assert_eq!(status.active_pollers, 0);
        assert_eq!(status.pending_count, 0);
    }

    #[test]
    fn test_recovery_report_changes() {
        assert!(!RecoveryReport::default().changed_anything());
        let report = RecoveryReport {
            missed: 2,
            already_polling: 1,
            ..Default::default()
        };
        assert!(!report.changed_anything());
        let report = RecoveryReport {
            rebound: 1,
            ..Default::default()
        };
        assert!(report.changed_anything());
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::JobNotFound("job-456".to_string());
        assert_eq!(err.to_string(), "job not found: job-456");

        let err = OrchestratorError::AlreadyFinished {
            job_id: "job-1".to_string(),
            status: JobStatus::Completed,
        };
        assert_eq!(err.to_string(), "job job-1 is already completed");

        let err: OrchestratorError = ValidationError::MissingField("text").into();
        assert_eq!(err.to_string(), "validation failed: missing required field: text");
    }
}
