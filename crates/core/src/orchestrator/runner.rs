//! Job orchestrator implementation.
//!
//! Wires the submitter, pollers, completer and recovery sweep around one
//! shared context. Every job follows the same state machine; the per-kind
//! differences live in the policy table.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::job::{JobError, JobFilter, JobRecord, JobStatus, JobStore};
use crate::metrics::{JOBS_FINISHED, JOB_DURATION};
use crate::owner::OwnerUpdater;
use crate::probe::MediaProber;
use crate::provider::ProviderRegistry;

use super::config::OrchestratorConfig;
use super::scheduler::PollerScheduler;
use super::types::{
    JobUpdateCallback, OrchestratorError, OrchestratorStatus, RecoveryReport, SubmitRequest,
};
use super::{recovery, submitter};

/// Collaborators shared by the submitter, pollers, completer and recovery.
#[derive(Clone)]
pub(crate) struct OrchestratorContext {
    pub(crate) config: OrchestratorConfig,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) owners: Arc<dyn OwnerUpdater>,
    pub(crate) prober: Option<Arc<dyn MediaProber>>,
    pub(crate) scheduler: Arc<PollerScheduler>,
    /// `true` between `start` and `stop`. Pollers exit as soon as it reads `false`.
    pub(crate) running: Arc<watch::Sender<bool>>,
    pub(crate) pollers: PollerTasks,
    pub(crate) on_update: Option<JobUpdateCallback>,
}

/// Spawned poller tasks, joined on stop.
#[derive(Clone, Default)]
pub(crate) struct PollerTasks(Arc<Mutex<JoinSet<()>>>);

impl PollerTasks {
    pub(crate) fn spawn<F>(&self, poller: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(poller);
    }

    /// Wait for every poller spawned so far to exit. Returns how many were joined.
    async fn drain(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks());
        let mut joined = 0;
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!("Poller task ended abnormally: {}", e);
            }
            joined += 1;
        }
        joined
    }

    fn tasks(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OrchestratorContext {
    /// Report a persisted change.
    pub(crate) fn notify(&self, job: &JobRecord) {
        if let Some(ref callback) = self.on_update {
            callback(job);
        }
    }

    /// Record a terminal transition in metrics and report it.
    pub(crate) fn finished(&self, job: &JobRecord) {
        let kind = job.kind.as_str();
        let status = job.status.as_str();
        JOBS_FINISHED.with_label_values(&[kind, status]).inc();
        let elapsed = (job.updated_at - job.created_at).num_milliseconds().max(0) as f64 / 1000.0;
        JOB_DURATION
            .with_label_values(&[kind, status])
            .observe(elapsed);
        self.notify(job);
    }
}

/// The job orchestrator: accepts submissions and drives every job to a
/// terminal state.
pub struct JobOrchestrator {
    ctx: Arc<OrchestratorContext>,
    /// Serializes `start` and `stop`.
    lifecycle: AsyncMutex<()>,
}

impl JobOrchestrator {
    /// Create a new orchestrator.
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn JobStore>,
        registry: Arc<ProviderRegistry>,
        cache: Arc<dyn CacheStore>,
        owners: Arc<dyn OwnerUpdater>,
    ) -> Self {
        let (running, _) = watch::channel(false);
        let scheduler = Arc::new(PollerScheduler::new(
            config.max_concurrent_pollers,
            config.max_queued_pollers,
        ));

        Self {
            ctx: Arc::new(OrchestratorContext {
                config,
                store,
                registry,
                cache,
                owners,
                prober: None,
                scheduler,
                running: Arc::new(running),
                pollers: PollerTasks::default(),
                on_update: None,
            }),
            lifecycle: AsyncMutex::new(()),
        }
    }

    /// Probe cached media for its real duration.
    pub fn with_prober(mut self, prober: Arc<dyn MediaProber>) -> Self {
        Arc::make_mut(&mut self.ctx).prober = Some(prober);
        self
    }

    /// Set a callback for job state changes.
    pub fn with_update_callback(mut self, callback: JobUpdateCallback) -> Self {
        Arc::make_mut(&mut self.ctx).on_update = Some(callback);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.ctx.store
    }

    pub fn is_running(&self) -> bool {
        *self.ctx.running.borrow()
    }

    /// Start accepting work and run the recovery sweep.
    pub async fn start(&self) -> RecoveryReport {
        let _lifecycle = self.lifecycle.lock().await;
        if self.ctx.running.send_replace(true) {
            warn!("Orchestrator already running");
            return RecoveryReport::default();
        }

        info!(
            "Starting job orchestrator (max {} concurrent pollers)",
            self.ctx.scheduler.max_concurrent()
        );

        let report = recovery::recover(&self.ctx).await;

        info!("Job orchestrator started");
        report
    }

    /// Stop all pollers and wait for them to exit. A poller that is waiting
    /// or querying exits without writing; one that is already completing
    /// finishes first.
    pub async fn stop(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.ctx.running.send_replace(false) {
            warn!("Orchestrator not running");
            return;
        }

        info!("Stopping job orchestrator");
        let joined = self.ctx.pollers.drain().await;
        info!(pollers = joined, "Job orchestrator stopped");
    }

    /// Run the recovery sweep again.
    pub async fn recover(&self) -> Result<RecoveryReport, OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }
        Ok(recovery::recover(&self.ctx).await)
    }

    /// Validate, persist and hand a job to its vendor. Returns without
    /// waiting for completion.
    pub async fn submit(&self, request: SubmitRequest) -> Result<JobRecord, OrchestratorError> {
        if !self.is_running() {
            return Err(OrchestratorError::NotRunning);
        }
        submitter::submit(&self.ctx, request).await
    }

    /// Force a job into `cancelled`. Its poller notices on its next check.
    pub async fn cancel(&self, id: &str, reason: &str) -> Result<JobRecord, OrchestratorError> {
        match self.ctx.store.mark_cancelled(id, reason) {
            Ok(job) => {
                info!(job_id = %id, "Job cancelled: {}", reason);
                self.ctx.finished(&job);
                Ok(job)
            }
            Err(JobError::NotFound(_)) => Err(OrchestratorError::JobNotFound(id.to_string())),
            Err(JobError::InvalidTransition { current, .. }) => {
                Err(OrchestratorError::AlreadyFinished {
                    job_id: id.to_string(),
                    status: current,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Get current orchestrator status.
    pub async fn status(&self) -> OrchestratorStatus {
        let count = |status: JobStatus| {
            self.ctx
                .store
                .count(&JobFilter::new().with_status(status))
                .unwrap_or(0) as usize
        };

        OrchestratorStatus {
            running: self.is_running(),
            active_pollers: self.ctx.scheduler.running(),
            queued_pollers: self.ctx.scheduler.waiting(),
            max_concurrent_pollers: self.ctx.scheduler.max_concurrent(),
            pending_count: count(JobStatus::Pending),
            processing_count: count(JobStatus::Processing),
            completed_count: count(JobStatus::Completed),
            failed_count: count(JobStatus::Failed),
            cancelled_count: count(JobStatus::Cancelled),
        }
    }
}
