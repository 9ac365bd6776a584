//! Submission path: validate, admit, persist, hand off to the vendor, spawn
//! the poller.

use tokio::time::timeout;
use tracing::{info, warn};

use crate::job::{CreateJobRequest, JobError, JobRecord, ValidationError};
use crate::metrics::JOBS_SUBMITTED;

use super::poller;
use super::runner::OrchestratorContext;
use super::types::{OrchestratorError, SubmitRequest};

pub(crate) async fn submit(
    ctx: &OrchestratorContext,
    request: SubmitRequest,
) -> Result<JobRecord, OrchestratorError> {
    let SubmitRequest {
        kind,
        mut payload,
        owner,
        provider,
    } = request;
    let kind_label = kind.as_str();

    if payload.kind() != kind {
        JOBS_SUBMITTED.with_label_values(&[kind_label, "invalid"]).inc();
        return Err(ValidationError::KindMismatch {
            kind,
            payload: payload.kind(),
        }
        .into());
    }

    ctx.registry.apply_defaults(&mut payload);
    if let Err(e) = payload.validate() {
        JOBS_SUBMITTED.with_label_values(&[kind_label, "invalid"]).inc();
        return Err(e.into());
    }

    let resolved = match ctx.registry.resolve(kind, provider.as_deref()) {
        Ok(resolved) => resolved,
        Err(e) => {
            JOBS_SUBMITTED
                .with_label_values(&[kind_label, "no_provider"])
                .inc();
            return Err(OrchestratorError::NoProvider(e.to_string()));
        }
    };

    let mut slot = match ctx.scheduler.try_reserve() {
        Ok(slot) => slot,
        Err(_) => {
            JOBS_SUBMITTED
                .with_label_values(&[kind_label, "saturated"])
                .inc();
            warn!(kind = %kind, "Rejecting submission, poller capacity exhausted");
            return Err(OrchestratorError::Saturated);
        }
    };

    let job = ctx.store.create(CreateJobRequest {
        kind,
        provider: resolved.name.clone(),
        model: resolved.model.clone(),
        payload,
        owner,
    })?;
    slot.bind(&job.id);

    let submitted = timeout(
        ctx.config.submit_timeout(),
        resolved
            .client
            .submit(kind, resolved.model.as_deref(), &job.payload),
    )
    .await;

    let task_id = match submitted {
        Ok(Ok(task_id)) if !task_id.trim().is_empty() => task_id,
        outcome => {
            let message = match outcome {
                Ok(Ok(_)) => "provider returned an empty task id".to_string(),
                Ok(Err(e)) => format!("submit failed: {}", e),
                Err(_) => "submit failed: timed out".to_string(),
            };
            warn!(job_id = %job.id, provider = %resolved.name, "{}", message);
            JOBS_SUBMITTED
                .with_label_values(&[kind_label, "vendor_error"])
                .inc();
            return match ctx.store.mark_failed(&job.id, &message) {
                Ok(failed) => {
                    ctx.finished(&failed);
                    Ok(failed)
                }
                Err(JobError::InvalidTransition { .. }) => Ok(current(ctx, job)),
                Err(e) => Err(e.into()),
            };
        }
    };

    let job = match ctx.store.mark_processing(&job.id, &task_id) {
        Ok(job) => job,
        Err(JobError::InvalidTransition { current: status, .. }) => {
            warn!(
                job_id = %job.id,
                task_id = %task_id,
                "Job became {} during submission, not polling",
                status
            );
            return Ok(current(ctx, job));
        }
        Err(e) => return Err(e.into()),
    };

    JOBS_SUBMITTED
        .with_label_values(&[kind_label, "accepted"])
        .inc();
    info!(
        job_id = %job.id,
        kind = %kind,
        provider = %job.provider,
        task_id = %task_id,
        "Job submitted"
    );
    ctx.notify(&job);

    poller::spawn(ctx.clone(), job.clone(), slot);
    Ok(job)
}

/// Latest stored version of `job`, falling back to the given copy.
fn current(ctx: &OrchestratorContext, job: JobRecord) -> JobRecord {
    ctx.store.get(&job.id).ok().flatten().unwrap_or(job)
}
