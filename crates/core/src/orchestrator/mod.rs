//! Job orchestrator for external vendor tasks.
//!
//! Every job follows one lifecycle:
//! - **Submit**: validate, admit, persist as `pending`, hand to the vendor, move to `processing`
//! - **Poll**: one poller per job, bounded by the scheduler, at the kind's interval
//! - **Complete**: cache the artifact, probe it, persist, update the owner
//! - **Recover**: on start, re-attach pollers and repair cache links

mod completer;
mod config;
mod poller;
mod recovery;
mod runner;
mod scheduler;
mod submitter;
mod types;

pub use config::{KindPolicy, OrchestratorConfig, PolicyOverride};
pub use runner::JobOrchestrator;
pub use scheduler::{PollerScheduler, PollerSlot, RunningPermit, Saturated};
pub use types::{
    JobUpdateCallback, OrchestratorError, OrchestratorStatus, RecoveryReport, SubmitRequest,
};
