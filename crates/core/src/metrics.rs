//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Submission (accepted, rejected, saturated)
//! - Polling (query outcomes, running/queued pollers)
//! - Completion (cache downloads, owner sync, end-to-end duration)
//! - Recovery sweep actions

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Submission
// =============================================================================

/// Submissions by kind and result.
pub static JOBS_SUBMITTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_jobs_submitted_total", "Total job submissions"),
        &["kind", "result"], // "accepted", "invalid", "no_provider", "saturated", "vendor_error"
    )
    .unwrap()
});

// =============================================================================
// Polling
// =============================================================================

/// Vendor status queries by kind and outcome.
pub static POLL_QUERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_poll_queries_total", "Vendor status queries"),
        &["kind", "outcome"], // task status, "error" or "timeout"
    )
    .unwrap()
});

/// Pollers currently holding a running slot.
pub static ACTIVE_POLLERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelforge_active_pollers",
        "Pollers currently running",
    )
    .unwrap()
});

/// Pollers admitted but waiting for a running slot.
pub static QUEUED_POLLERS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "reelforge_queued_pollers",
        "Pollers waiting for a running slot",
    )
    .unwrap()
});

// =============================================================================
// Completion
// =============================================================================

/// Jobs reaching a terminal state, by kind and status.
pub static JOBS_FINISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_jobs_finished_total", "Jobs reaching a terminal state"),
        &["kind", "status"],
    )
    .unwrap()
});

/// Submission-to-terminal time in seconds.
pub static JOB_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "reelforge_job_duration_seconds",
            "Time from job creation to terminal state",
        )
        .buckets(vec![
            1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 3000.0,
        ]),
        &["kind", "status"],
    )
    .unwrap()
});

/// Artifact downloads into the local cache.
pub static CACHE_DOWNLOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_cache_downloads_total", "Artifact cache downloads"),
        &["category", "result"], // "ok", "error"
    )
    .unwrap()
});

/// Owner media updates.
pub static OWNER_SYNCS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_owner_syncs_total", "Owner media updates"),
        &["result"], // "ok", "error"
    )
    .unwrap()
});

// =============================================================================
// Recovery
// =============================================================================

/// Actions taken by the recovery sweep.
pub static RECOVERY_ACTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelforge_recovery_actions_total", "Recovery sweep actions"),
        &["action"], // "reattached", "redownloaded", "rebound", "missed", "owner_resynced"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(POLL_QUERIES.clone()),
        Box::new(ACTIVE_POLLERS.clone()),
        Box::new(QUEUED_POLLERS.clone()),
        Box::new(JOBS_FINISHED.clone()),
        Box::new(JOB_DURATION.clone()),
        Box::new(CACHE_DOWNLOADS.clone()),
        Box::new(OWNER_SYNCS.clone()),
        Box::new(RECOVERY_ACTIONS.clone()),
    ]
}
