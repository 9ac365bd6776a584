//! Job API handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use reelforge_core::{
    JobError, JobFilter, JobKind, JobPayload, JobRecord, JobStatus, OrchestratorError, OwnerKind,
    OwnerRef, SubmitRequest,
};
use tracing::error;

use crate::state::AppState;

/// Maximum allowed limit for job queries
const MAX_LIMIT: i64 = 1000;

/// Default limit for job queries
const DEFAULT_LIMIT: i64 = 100;

const DEFAULT_CANCEL_REASON: &str = "cancelled by request";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for submitting a job
#[derive(Debug, Deserialize)]
pub struct SubmitJobBody {
    /// Taken from the payload when absent.
    pub kind: Option<JobKind>,
    pub payload: JobPayload,
    pub owner: Option<OwnerRef>,
    /// Provider override
    pub provider: Option<String>,
}

impl From<SubmitJobBody> for SubmitRequest {
    fn from(body: SubmitJobBody) -> Self {
        let mut request = SubmitRequest::new(body.payload);
        if let Some(kind) = body.kind {
            request.kind = kind;
        }
        request.owner = body.owner;
        request.provider = body.provider;
        request
    }
}

/// Query parameters for listing jobs
#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub kind: Option<String>,
    /// Owner filter; needs `owner_id` as well
    pub owner_kind: Option<String>,
    pub owner_id: Option<String>,
    /// Maximum number of jobs to return
    pub limit: Option<i64>,
    /// Pagination offset
    pub offset: Option<i64>,
}

/// Request body for cancelling a job
#[derive(Debug, Deserialize)]
pub struct CancelJobBody {
    pub reason: Option<String>,
}

/// Response for job operations
#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: String,
    pub kind: JobKind,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: JobStatus,
    pub payload: JobPayload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stable_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerRef>,
    pub owner_synced: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id,
            kind: job.kind,
            provider: job.provider,
            model: job.model,
            status: job.status,
            payload: job.payload,
            external_task_id: job.external_task_id,
            result_url: job.result_url,
            stable_url: job.stable_url,
            duration_secs: job.duration_secs,
            error_message: job.error_message,
            owner: job.owner,
            owner_synced: job.owner_synced,
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct JobErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<JobErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(JobErrorResponse {
            error: error.into(),
        }),
    )
}

fn orchestrator_error(e: OrchestratorError) -> ApiError {
    let status = match &e {
        OrchestratorError::Validation(_) | OrchestratorError::NoProvider(_) => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::Saturated => StatusCode::TOO_MANY_REQUESTS,
        OrchestratorError::JobNotFound(_) => StatusCode::NOT_FOUND,
        OrchestratorError::AlreadyFinished { .. } => StatusCode::CONFLICT,
        OrchestratorError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::Store(_) => {
            error!("Job store error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, e.to_string())
}

fn list_filter(params: &ListJobsParams) -> Result<JobFilter, String> {
    let mut filter = JobFilter::new();

    if let Some(ref status) = params.status {
        filter = filter.with_status(status.parse::<JobStatus>().map_err(|e| e.to_string())?);
    }

    if let Some(ref kind) = params.kind {
        filter = filter.with_kind(kind.parse::<JobKind>().map_err(|e| e.to_string())?);
    }

    match (&params.owner_kind, &params.owner_id) {
        (Some(kind), Some(id)) => {
            let kind = kind.parse::<OwnerKind>().map_err(|e| e.to_string())?;
            filter = filter.with_owner(OwnerRef::new(kind, id.clone()));
        }
        (None, None) => {}
        _ => return Err("owner_kind and owner_id must be given together".to_string()),
    }

    Ok(filter)
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a job to its vendor.
///
/// Returns 202 with the created record. A vendor that rejects the submission
/// still yields a record, already `failed`.
pub async fn submit_job(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubmitJobBody>,
) -> Result<(StatusCode, Json<JobResponse>), impl IntoResponse> {
    match state.orchestrator().submit(body.into()).await {
        Ok(job) => Ok((StatusCode::ACCEPTED, Json(JobResponse::from(job)))),
        Err(e) => Err(orchestrator_error(e)),
    }
}

/// Get a job by ID
pub async fn get_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.job_store().get(&id) {
        Ok(Some(job)) => Ok(Json(JobResponse::from(job))),
        Ok(None) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// List jobs with optional filters
pub async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0).max(0);

    let filter = list_filter(&params).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let total = state
        .job_store()
        .count(&filter)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let jobs = state
        .job_store()
        .list(&filter.with_limit(limit).with_offset(offset))
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ListJobsResponse {
        jobs: jobs.into_iter().map(JobResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Cancel a pending or processing job
pub async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<CancelJobBody>>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    let reason = body
        .and_then(|b| b.reason.clone())
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

    match state.orchestrator().cancel(&id, &reason).await {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(e) => Err(orchestrator_error(e)),
    }
}

/// Hide a job from reads and recovery. The record is kept.
pub async fn delete_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, impl IntoResponse> {
    match state.job_store().soft_delete(&id) {
        Ok(job) => Ok(Json(JobResponse::from(job))),
        Err(JobError::NotFound(_)) => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Job not found: {}", id),
        )),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}
