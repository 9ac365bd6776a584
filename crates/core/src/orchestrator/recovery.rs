//! Startup recovery sweep.
//!
//! Runs in order:
//! 1. re-attach a poller to every `processing` job with a vendor handle
//! 2. report jobs stuck in `pending`
//! 3. repair completed jobs whose cached copy is missing, by re-downloading
//!    the vendor URL or binding an unclaimed cache file written within two
//!    minutes of completion
//! 4. push media to owners that are out of date
//!
//! Every step is idempotent; a second sweep over the same state changes nothing.

use std::collections::HashMap;

use chrono::Duration;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::cache::{closest_within, CachedFile};
use crate::job::{JobFilter, JobRecord, JobStatus};
use crate::metrics::RECOVERY_ACTIONS;

use super::completer::sync_owner;
use super::poller;
use super::runner::OrchestratorContext;
use super::types::RecoveryReport;

/// How far a cache file's time may drift from a job's completion time.
const REBIND_WINDOW_SECS: i64 = 120;

/// Owner updates issued at once during a sweep.
const OWNER_SYNC_PARALLELISM: usize = 8;

pub(crate) async fn recover(ctx: &OrchestratorContext) -> RecoveryReport {
    let mut report = RecoveryReport::default();

    reattach_pollers(ctx, &mut report);
    count_stuck_pending(ctx, &mut report);
    repair_cache_links(ctx, &mut report).await;
    resync_owners(ctx, &mut report).await;

    if report.changed_anything() || report.missed > 0 || report.stuck_pending > 0 {
        info!(
            reattached = report.reattached,
            redownloaded = report.redownloaded,
            rebound = report.rebound,
            missed = report.missed,
            owners_resynced = report.owners_resynced,
            stuck_pending = report.stuck_pending,
            "Recovery sweep finished"
        );
    } else {
        debug!("Recovery sweep found nothing to do");
    }
    report
}

fn reattach_pollers(ctx: &OrchestratorContext, report: &mut RecoveryReport) {
    let jobs = match ctx.store.list_processing_with_task() {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!("Failed to list processing jobs: {}", e);
            return;
        }
    };

    for job in jobs {
        if ctx.scheduler.is_active(&job.id) {
            report.already_polling += 1;
            continue;
        }

        let mut slot = ctx.scheduler.reserve();
        if !slot.bind(&job.id) {
            report.already_polling += 1;
            continue;
        }

        info!(job_id = %job.id, "Re-attaching poller");
        RECOVERY_ACTIONS.with_label_values(&["reattached"]).inc();
        report.reattached += 1;
        poller::spawn(ctx.clone(), job, slot);
    }
}

fn count_stuck_pending(ctx: &OrchestratorContext, report: &mut RecoveryReport) {
    match ctx
        .store
        .count(&JobFilter::new().with_status(JobStatus::Pending))
    {
        Ok(0) => {}
        Ok(n) => {
            report.stuck_pending = n as usize;
            warn!("{} job(s) stuck in pending without a vendor handle", n);
        }
        Err(e) => warn!("Failed to count pending jobs: {}", e),
    }
}

/// Completed jobs with no usable cache copy.
async fn cache_repair_candidates(ctx: &OrchestratorContext) -> Vec<JobRecord> {
    let mut candidates = ctx.store.list_completed_missing_cache().unwrap_or_else(|e| {
        warn!("Failed to list jobs missing a cache link: {}", e);
        Vec::new()
    });

    let linked = ctx.store.list_completed_with_stable_url().unwrap_or_else(|e| {
        warn!("Failed to list cached jobs: {}", e);
        Vec::new()
    });
    for job in linked {
        let Some(url) = job.stable_url.as_deref() else {
            continue;
        };
        if ctx.cache.resolve(url).is_some() && !ctx.cache.contains(url).await {
            debug!(job_id = %job.id, "Cached file {} is gone", url);
            candidates.push(job);
        }
    }

    candidates
}

async fn repair_cache_links(ctx: &OrchestratorContext, report: &mut RecoveryReport) {
    let mut scanned: HashMap<&'static str, Vec<CachedFile>> = HashMap::new();

    for job in cache_repair_candidates(ctx).await {
        let category = job.kind.cache_category();

        if redownload(ctx, &job, category).await {
            RECOVERY_ACTIONS.with_label_values(&["redownloaded"]).inc();
            report.redownloaded += 1;
            continue;
        }

        if !scanned.contains_key(category) {
            let files = ctx.cache.scan(category).await.unwrap_or_else(|e| {
                warn!("Failed to scan cache category {}: {}", category, e);
                Vec::new()
            });
            scanned.insert(category, files);
        }
        let files = scanned.get(category).map(Vec::as_slice).unwrap_or_default();

        if rebind_orphan(ctx, &job, files) {
            RECOVERY_ACTIONS.with_label_values(&["rebound"]).inc();
            report.rebound += 1;
        } else {
            warn!(job_id = %job.id, "No cached copy available for completed job");
            RECOVERY_ACTIONS.with_label_values(&["missed"]).inc();
            report.missed += 1;
        }
    }
}

async fn redownload(ctx: &OrchestratorContext, job: &JobRecord, category: &str) -> bool {
    let Some(url) = job
        .result_url
        .as_deref()
        .map(str::trim)
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
    else {
        return false;
    };

    let stored = match ctx.cache.store(url, category).await {
        Ok(stored) => stored,
        Err(e) => {
            debug!(job_id = %job.id, "Re-download of {} failed: {}", url, e);
            return false;
        }
    };

    match ctx.store.rebind_stable_url(&job.id, &stored.stable_url) {
        Ok(updated) => {
            info!(job_id = %job.id, stable_url = %stored.stable_url, "Re-cached result");
            ctx.notify(&updated);
            true
        }
        Err(e) => {
            warn!(job_id = %job.id, "Failed to record re-cached URL: {}", e);
            if let Err(e) = ctx.cache.remove(&stored.stable_url).await {
                warn!(job_id = %job.id, "Failed to remove unused file: {}", e);
            }
            false
        }
    }
}

/// Bind the closest unclaimed file cached around the job's completion time.
fn rebind_orphan(ctx: &OrchestratorContext, job: &JobRecord, files: &[CachedFile]) -> bool {
    let target = job.completed_at.unwrap_or(job.updated_at);

    for file in closest_within(files, target, Duration::seconds(REBIND_WINDOW_SECS)) {
        match ctx.store.stable_url_in_use(&file.stable_url) {
            Ok(false) => {}
            Ok(true) => continue,
            Err(e) => {
                warn!("Failed to check cache file claim: {}", e);
                return false;
            }
        }

        return match ctx.store.rebind_stable_url(&job.id, &file.stable_url) {
            Ok(updated) => {
                info!(job_id = %job.id, stable_url = %file.stable_url, "Bound orphaned cache file");
                ctx.notify(&updated);
                true
            }
            Err(e) => {
                warn!(job_id = %job.id, "Failed to bind cache file: {}", e);
                false
            }
        };
    }
    false
}

async fn resync_owners(ctx: &OrchestratorContext, report: &mut RecoveryReport) {
    let jobs = match ctx.store.list_completed_unsynced_owner() {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!("Failed to list unsynced owners: {}", e);
            return;
        }
    };

    let synced = stream::iter(jobs)
        .map(|job| async move { sync_owner(ctx, &job).await })
        .buffer_unordered(OWNER_SYNC_PARALLELISM)
        .filter(|ok| std::future::ready(*ok))
        .count()
        .await;

    RECOVERY_ACTIONS
        .with_label_values(&["owner_resynced"])
        .inc_by(synced as u64);
    report.owners_resynced += synced;
}
