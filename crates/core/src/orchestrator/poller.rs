//! Per-job polling loop.
//!
//! A poller owns one admission slot, waits for a running slot, then queries
//! the vendor at the kind's interval until the task reaches a terminal state,
//! the job leaves `processing`, or the deadline passes. A terminal write that
//! fails on the store is retried at the next interval.

use std::time::Instant;

use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::job::{JobError, JobRecord, JobStatus};
use crate::metrics::POLL_QUERIES;
use crate::provider::{TaskSnapshot, TaskStatus};

use super::completer::{self, Completion};
use super::runner::OrchestratorContext;
use super::scheduler::PollerSlot;

/// What the loop does after one vendor answer.
#[derive(Debug, PartialEq)]
enum Step {
    Wait,
    Complete { result_url: String },
    Fail(String),
}

fn classify(snapshot: &TaskSnapshot) -> Step {
    match snapshot.status {
        TaskStatus::Pending => Step::Wait,
        TaskStatus::Done => match snapshot.usable_result_url() {
            Some(url) => Step::Complete {
                result_url: url.to_string(),
            },
            None => Step::Fail("task completed but no result URL".to_string()),
        },
        TaskStatus::Failed | TaskStatus::Expired | TaskStatus::NotFound => Step::Fail(
            snapshot
                .error_detail
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("task status {}", snapshot.status)),
        ),
    }
}

/// Spawn the poller for a job that is in `processing`.
pub(crate) fn spawn(ctx: OrchestratorContext, job: JobRecord, slot: PollerSlot) {
    let running = ctx.running.subscribe();
    let tasks = ctx.pollers.clone();
    tasks.spawn(run(ctx, job, slot, running));
}

/// Resolves once the orchestrator is stopped, including when it already is.
async fn stopped(running: &mut watch::Receiver<bool>) {
    let _ = running.wait_for(|running| !*running).await;
}

async fn run(
    ctx: OrchestratorContext,
    job: JobRecord,
    slot: PollerSlot,
    mut running: watch::Receiver<bool>,
) {
    let kind = job.kind;
    let policy = ctx.config.policy(kind);

    let _permit = tokio::select! {
        _ = stopped(&mut running) => {
            debug!(job_id = %job.id, "Shutdown before poller started");
            return;
        }
        permit = slot.acquire() => match permit {
            Some(permit) => permit,
            None => return,
        },
    };

    debug!(
        job_id = %job.id,
        "Polling every {:?} for at most {:?}",
        policy.poll_interval,
        policy.max_wait
    );
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = stopped(&mut running) => {
                debug!(job_id = %job.id, "Poller stopping for shutdown");
                return;
            }
            _ = sleep(policy.poll_interval) => {}
        }

        if started.elapsed() >= policy.max_wait {
            warn!(job_id = %job.id, "Job exceeded {:?} without finishing", policy.max_wait);
            POLL_QUERIES.with_label_values(&[kind.as_str(), "timeout"]).inc();
            if fail(&ctx, &job.id, "timeout") {
                return;
            }
            continue;
        }

        let current = match ctx.store.get(&job.id) {
            Ok(Some(current)) if current.status == JobStatus::Processing => current,
            Ok(Some(current)) => {
                debug!(job_id = %job.id, "Job is {}, poller exiting", current.status);
                return;
            }
            Ok(None) => {
                debug!(job_id = %job.id, "Job deleted, poller exiting");
                return;
            }
            Err(e) => {
                warn!(job_id = %job.id, "Failed to reload job: {}", e);
                continue;
            }
        };

        let Some(task_id) = current.external_task_id.as_deref() else {
            return;
        };

        let Some(client) = ctx.registry.get(&current.provider) else {
            warn!(
                job_id = %job.id,
                "Provider {} is not registered, will retry",
                current.provider
            );
            continue;
        };

        let queried = tokio::select! {
            _ = stopped(&mut running) => {
                debug!(job_id = %job.id, "Poller stopping during status query");
                return;
            }
            queried = timeout(ctx.config.query_timeout(), client.query(kind, task_id)) => queried,
        };

        let snapshot = match queried {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                POLL_QUERIES.with_label_values(&[kind.as_str(), "error"]).inc();
                warn!(job_id = %job.id, task_id = %task_id, "Status query failed: {}", e);
                continue;
            }
            Err(_) => {
                POLL_QUERIES.with_label_values(&[kind.as_str(), "error"]).inc();
                warn!(job_id = %job.id, task_id = %task_id, "Status query timed out");
                continue;
            }
        };
        POLL_QUERIES
            .with_label_values(&[kind.as_str(), snapshot.status.as_str()])
            .inc();

        match classify(&snapshot) {
            Step::Wait => {}
            Step::Complete { result_url } => {
                match completer::complete(&ctx, &current, &result_url, snapshot.duration_secs)
                    .await
                {
                    Completion::Retry => continue,
                    Completion::Stored | Completion::Superseded => return,
                }
            }
            Step::Fail(reason) => {
                if fail(&ctx, &job.id, &reason) {
                    return;
                }
            }
        }
    }
}

/// Move the job to `failed`. Returns `false` when the store write errored
/// and the poller should try again.
fn fail(ctx: &OrchestratorContext, job_id: &str, reason: &str) -> bool {
    match ctx.store.mark_failed(job_id, reason) {
        Ok(failed) => {
            info!(job_id = %job_id, "Job failed: {}", reason);
            ctx.finished(&failed);
            true
        }
        Err(JobError::InvalidTransition { current, .. }) => {
            debug!(job_id = %job_id, "Job already {}, not failing", current);
            true
        }
        Err(JobError::NotFound(_)) => true,
        Err(e) => {
            warn!(job_id = %job_id, "Failed to mark job failed, will retry: {}", e);
            false
        }
    }
}
