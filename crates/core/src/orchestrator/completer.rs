//! Completion path: cache the artifact, probe it, persist, update the owner.

use tracing::{debug, info, warn};

use crate::job::{JobCompletion, JobError, JobRecord};
use crate::metrics::{CACHE_DOWNLOADS, OWNER_SYNCS};
use crate::owner::OwnerMedia;

use super::runner::OrchestratorContext;

/// Outcome of one completion attempt.
#[derive(Debug)]
pub(crate) enum Completion {
    Stored,
    /// The job left `processing` before the write.
    Superseded,
    /// The store rejected the write for another reason; nothing was kept.
    Retry,
}

/// Finish a job whose vendor task produced `result_url`.
///
/// A caching failure degrades to the vendor URL instead of failing the job.
pub(crate) async fn complete(
    ctx: &OrchestratorContext,
    job: &JobRecord,
    result_url: &str,
    vendor_duration: Option<f64>,
) -> Completion {
    let category = job.kind.cache_category();

    let (stable_url, cached_path) = match ctx.cache.store(result_url, category).await {
        Ok(stored) => {
            CACHE_DOWNLOADS.with_label_values(&[category, "ok"]).inc();
            (stored.stable_url, Some(stored.path))
        }
        Err(e) => {
            CACHE_DOWNLOADS.with_label_values(&[category, "error"]).inc();
            warn!(
                job_id = %job.id,
                "Caching {} failed, keeping vendor URL: {}",
                result_url,
                e
            );
            (result_url.to_string(), None)
        }
    };

    let mut duration_secs = vendor_duration;
    if job.kind.probes_duration() {
        if let (Some(prober), Some(path)) = (ctx.prober.as_ref(), cached_path.as_ref()) {
            match prober.duration_secs(path).await {
                Ok(secs) => duration_secs = Some(secs),
                Err(e) => warn!(job_id = %job.id, "Duration probe failed: {}", e),
            }
        }
    }

    let completion = JobCompletion {
        result_url: result_url.to_string(),
        stable_url: stable_url.clone(),
        duration_secs,
    };

    match ctx.store.mark_completed(&job.id, &completion) {
        Ok(done) => {
            info!(job_id = %done.id, stable_url = %stable_url, "Job completed");
            ctx.finished(&done);
            sync_owner(ctx, &done).await;
            Completion::Stored
        }
        Err(JobError::InvalidTransition { current, .. }) => {
            info!(
                job_id = %job.id,
                "Job became {} before completion, discarding result",
                current
            );
            discard(ctx, job, &stable_url, cached_path.is_some()).await;
            Completion::Superseded
        }
        Err(JobError::NotFound(_)) => {
            debug!(job_id = %job.id, "Job deleted before completion, discarding result");
            discard(ctx, job, &stable_url, cached_path.is_some()).await;
            Completion::Superseded
        }
        Err(e) => {
            warn!(job_id = %job.id, "Failed to record completion, will retry: {}", e);
            discard(ctx, job, &stable_url, cached_path.is_some()).await;
            Completion::Retry
        }
    }
}

/// Remove a file cached for a completion that was not stored.
async fn discard(ctx: &OrchestratorContext, job: &JobRecord, stable_url: &str, cached: bool) {
    if !cached {
        return;
    }
    if let Err(e) = ctx.cache.remove(stable_url).await {
        warn!(job_id = %job.id, "Failed to remove discarded file: {}", e);
    }
}

/// Push a completed job's media to its owner. Returns whether the owner now
/// mirrors the job.
pub(crate) async fn sync_owner(ctx: &OrchestratorContext, job: &JobRecord) -> bool {
    let (Some(owner), Some(url)) = (job.owner.as_ref(), job.stable_url.as_deref()) else {
        return false;
    };

    let media = OwnerMedia {
        url: url.to_string(),
        duration_secs: job.duration_secs,
    };

    if let Err(e) = ctx.owners.set_media(owner, &media).await {
        OWNER_SYNCS.with_label_values(&["error"]).inc();
        warn!(job_id = %job.id, owner = %owner, "Owner update failed: {}", e);
        return false;
    }
    OWNER_SYNCS.with_label_values(&["ok"]).inc();

    if let Err(e) = ctx.store.mark_owner_synced(&job.id) {
        warn!(job_id = %job.id, "Failed to record owner sync: {}", e);
    }
    debug!(job_id = %job.id, owner = %owner, "Owner media updated");
    true
}
