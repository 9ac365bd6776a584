//! Bounded admission for pollers.
//!
//! A fixed number of pollers run at once; a bounded number more may wait for
//! a running slot. Submissions beyond that are refused up front so callers
//! see backpressure instead of an ever-growing task list.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use prometheus::IntGauge;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::metrics::{ACTIVE_POLLERS, QUEUED_POLLERS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("poller capacity exhausted")]
pub struct Saturated;

pub struct PollerScheduler {
    running: Arc<Semaphore>,
    max_concurrent: usize,
    max_queued: usize,
    /// Outstanding slots, running or waiting.
    admitted: AtomicUsize,
    /// Jobs with a poller bound in this process.
    active: Mutex<HashSet<String>>,
}

impl PollerScheduler {
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            running: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            max_queued,
            admitted: AtomicUsize::new(0),
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Reserve a slot if capacity remains.
    pub fn try_reserve(self: &Arc<Self>) -> Result<PollerSlot, Saturated> {
        let capacity = self.max_concurrent + self.max_queued;
        self.admitted
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < capacity).then_some(n + 1)
            })
            .map_err(|_| Saturated)?;
        Ok(PollerSlot::new(Arc::clone(self)))
    }

    /// Reserve a slot regardless of capacity. The poller waits for a running slot.
    pub fn reserve(self: &Arc<Self>) -> PollerSlot {
        self.admitted.fetch_add(1, Ordering::SeqCst);
        PollerSlot::new(Arc::clone(self))
    }

    pub fn is_active(&self, job_id: &str) -> bool {
        self.active_set().contains(job_id)
    }

    /// Job ids with a bound poller, sorted.
    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.active_set().iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Pollers holding a running slot.
    pub fn running(&self) -> usize {
        self.max_concurrent - self.running.available_permits()
    }

    /// Slots reserved but not running.
    pub fn waiting(&self) -> usize {
        self.admitted
            .load(Ordering::SeqCst)
            .saturating_sub(self.running())
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    fn active_set(&self) -> std::sync::MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Increments a gauge for as long as it lives.
struct GaugeGuard(&'static IntGauge);

impl GaugeGuard {
    fn new(gauge: &'static IntGauge) -> Self {
        gauge.inc();
        Self(gauge)
    }
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.dec();
    }
}

/// A running slot held by a poller.
pub struct RunningPermit {
    _permit: OwnedSemaphorePermit,
    _gauge: GaugeGuard,
}

/// Admission reservation. Dropping it releases the reservation and unbinds
/// the job.
pub struct PollerSlot {
    scheduler: Arc<PollerScheduler>,
    job_id: Option<String>,
}

impl PollerSlot {
    fn new(scheduler: Arc<PollerScheduler>) -> Self {
        Self {
            scheduler,
            job_id: None,
        }
    }

    /// Claim `job_id` for this slot. Fails when the job already has a poller.
    pub fn bind(&mut self, job_id: &str) -> bool {
        if self.job_id.is_some() {
            return false;
        }
        if !self.scheduler.active_set().insert(job_id.to_string()) {
            return false;
        }
        self.job_id = Some(job_id.to_string());
        true
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Wait for a running slot.
    pub async fn acquire(&self) -> Option<RunningPermit> {
        let _queued = GaugeGuard::new(&QUEUED_POLLERS);
        let permit = Arc::clone(&self.scheduler.running)
            .acquire_owned()
            .await
            .ok()?;
        Some(RunningPermit {
            _permit: permit,
            _gauge: GaugeGuard::new(&ACTIVE_POLLERS),
        })
    }
}

impl Drop for PollerSlot {
    fn drop(&mut self) {
        self.scheduler.admitted.fetch_sub(1, Ordering::SeqCst);
        if let Some(id) = self.job_id.take() {
            self.scheduler.active_set().remove(&id);
        }
    }
}
