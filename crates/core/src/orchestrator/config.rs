//! Orchestrator configuration and the per-kind policy table.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobKind;

/// Polling behaviour for one job kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    /// Sleep between vendor queries.
    pub poll_interval: Duration,
    /// Elapsed time after which the job fails with "timeout".
    pub max_wait: Duration,
}

impl KindPolicy {
    pub fn new(poll_interval: Duration, max_wait: Duration) -> Self {
        Self {
            poll_interval,
            max_wait,
        }
    }

    /// Built-in defaults, tuned to each vendor's typical turnaround.
    pub fn for_kind(kind: JobKind) -> Self {
        match kind {
            JobKind::VideoRender => Self::new(Duration::from_secs(10), Duration::from_secs(50 * 60)),
            JobKind::AvatarRender => Self::new(Duration::from_secs(5), Duration::from_secs(12 * 60)),
            JobKind::TtsSynthesis => Self::new(Duration::from_millis(1200), Duration::from_secs(120)),
            JobKind::VoiceClone => Self::new(Duration::from_secs(3), Duration::from_secs(2 * 60)),
            JobKind::VideoMerge => Self::new(Duration::from_secs(5), Duration::from_secs(20 * 60)),
        }
    }
}

/// Partial override of a [`KindPolicy`] from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wait_ms: Option<u64>,
}

/// Configuration for the job orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Pollers allowed to run at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_pollers: usize,

    /// Pollers allowed to wait for a running slot. Submissions beyond
    /// running + queued are rejected.
    #[serde(default = "default_max_queued")]
    pub max_queued_pollers: usize,

    /// Upper bound on a single vendor status query.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Upper bound on handing a job to its vendor. A submit that overruns
    /// fails the job.
    #[serde(default = "default_submit_timeout")]
    pub submit_timeout_secs: u64,

    #[serde(default)]
    pub policies: BTreeMap<JobKind, PolicyOverride>,
}

fn default_max_concurrent() -> usize {
    64
}

fn default_max_queued() -> usize {
    256
}

fn default_query_timeout() -> u64 {
    30
}

fn default_submit_timeout() -> u64 {
    120
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_pollers: default_max_concurrent(),
            max_queued_pollers: default_max_queued(),
            query_timeout_secs: default_query_timeout(),
            submit_timeout_secs: default_submit_timeout(),
            policies: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Effective policy for `kind`: built-in defaults with overrides applied.
    pub fn policy(&self, kind: JobKind) -> KindPolicy {
        let mut policy = KindPolicy::for_kind(kind);
        if let Some(o) = self.policies.get(&kind) {
            if let Some(ms) = o.poll_interval_ms {
                policy.poll_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = o.max_wait_ms {
                policy.max_wait = Duration::from_millis(ms);
            }
        }
        policy
    }

    /// Override the policy for one kind.
    pub fn with_policy(mut self, kind: JobKind, policy: KindPolicy) -> Self {
        self.policies.insert(
            kind,
            PolicyOverride {
                poll_interval_ms: Some(policy.poll_interval.as_millis() as u64),
                max_wait_ms: Some(policy.max_wait.as_millis() as u64),
            },
        );
        self
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }
}
