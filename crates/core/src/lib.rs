pub mod cache;
pub mod config;
pub mod job;
pub mod metrics;
pub mod orchestrator;
pub mod owner;
pub mod probe;
pub mod provider;
pub mod testing;

pub use cache::{CacheError, CacheStore, CachedFile, LocalCacheStore, StoredMedia};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use job::{
    CreateJobRequest, JobError, JobFilter, JobKind, JobPayload, JobRecord, JobStatus, JobStore,
    SqliteJobStore, ValidationError,
};
pub use orchestrator::{
    JobOrchestrator, JobUpdateCallback, OrchestratorConfig, OrchestratorError,
    OrchestratorStatus, RecoveryReport, SubmitRequest,
};
pub use owner::{OwnerError, OwnerKind, OwnerMedia, OwnerRef, OwnerUpdater, SqliteOwnerMediaStore};
pub use probe::{FfprobeProber, MediaProber, ProbeError};
pub use provider::{
    ProviderClient, ProviderError, ProviderRegistry, TaskSnapshot, TaskStatus,
    VolcengineTtsClient,
};
