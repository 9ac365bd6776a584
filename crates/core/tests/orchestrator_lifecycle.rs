//! Orchestrator lifecycle integration tests.
//!
//! These tests drive jobs through the orchestrator end to end:
//! pending -> processing -> completed | failed | cancelled

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use reelforge_core::{
    config::VolcengineTtsConfig,
    job::{
        CreateJobRequest, JobCompletion, JobError, JobFilter, JobKind, JobRecord, JobStatus,
        JobStore, SqliteJobStore,
    },
    orchestrator::OrchestratorConfig,
    owner::{OwnerKind, OwnerRef, OwnerUpdater, SqliteOwnerMediaStore},
    provider::{ProviderError, ProviderRegistry, TaskSnapshot},
    testing::{fixtures, MockCacheStore, MockOwnerUpdater, MockProber, MockProviderClient},
    CacheStore, JobOrchestrator, LocalCacheStore, OrchestratorError, SubmitRequest,
    VolcengineTtsClient,
};

/// Test helper to create all dependencies for orchestrator testing.
struct TestHarness {
    store: Arc<SqliteJobStore>,
    provider: Arc<MockProviderClient>,
    cache: Arc<MockCacheStore>,
    owners: Arc<MockOwnerUpdater>,
    prober: Arc<MockProber>,
    _temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteJobStore::new(&temp_dir.path().join("jobs.db"))
                .expect("Failed to create job store"),
        );

        Self {
            store,
            provider: Arc::new(MockProviderClient::new("mock")),
            cache: Arc::new(MockCacheStore::new()),
            owners: Arc::new(MockOwnerUpdater::new()),
            prober: Arc::new(MockProber::new(8.25)),
            _temp_dir: temp_dir,
        }
    }

    fn registry(&self) -> ProviderRegistry {
        JobKind::ALL.iter().fold(
            ProviderRegistry::new().register(self.provider.clone()),
            |registry, kind| {
                registry.with_default(*kind, "mock", Some("mock-model-1".to_string()))
            },
        )
    }

    fn orchestrator(&self, config: OrchestratorConfig) -> JobOrchestrator {
        JobOrchestrator::new(
            config,
            Arc::clone(&self.store) as Arc<dyn JobStore>,
            Arc::new(self.registry()),
            Arc::clone(&self.cache) as Arc<dyn CacheStore>,
            Arc::clone(&self.owners) as Arc<dyn OwnerUpdater>,
        )
        .with_prober(self.prober.clone())
    }

    async fn started(&self) -> JobOrchestrator {
        let orchestrator = self.orchestrator(fixtures::fast_config(20, 5_000));
        orchestrator.start().await;
        orchestrator
    }

    async fn wait_for_status(&self, job_id: &str, expected: JobStatus) -> JobRecord {
        wait_for_status(self.store.as_ref(), job_id, expected).await
    }
}

async fn wait_for_status(store: &dyn JobStore, job_id: &str, expected: JobStatus) -> JobRecord {
    let start = std::time::Instant::now();
    loop {
        let job = store
            .get(job_id)
            .expect("Failed to load job")
            .expect("Job disappeared");
        if job.status == expected {
            return job;
        }
        if start.elapsed() > Duration::from_secs(5) {
            panic!(
                "Job {} stuck in {} while waiting for {}",
                job_id, job.status, expected
            );
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_video_job_completes_with_cached_copy_and_owner() {
    let harness = TestHarness::new();
    let vendor_url = "https://vendor.example/out/clip-1.mp4?sig=abc";
    harness.cache.add_source(vendor_url, "video-bytes").await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url).with_duration(8.0))
        .await;

    let orchestrator = harness.started().await;
    let owner = OwnerRef::new(OwnerKind::Storyboard, "42");
    let job = orchestrator
        .submit(
            SubmitRequest::new(fixtures::video_payload("a cat surfing"))
                .with_owner(owner.clone()),
        )
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.external_task_id.as_deref(), Some("mock-task-1"));
    assert_eq!(job.provider, "mock");
    assert_eq!(job.model.as_deref(), Some("mock-model-1"));

    let done = harness.wait_for_status(&job.id, JobStatus::Completed).await;
    let stable_url = done.stable_url.clone().unwrap();
    assert!(stable_url.starts_with("/static/videos/"));
    assert!(stable_url.ends_with(".mp4"));
    assert_eq!(done.result_url.as_deref(), Some(vendor_url));
    assert_eq!(done.duration_secs, Some(8.25));
    assert!(done.completed_at.is_some());
    assert!(done.error_message.is_none());
    assert_eq!(
        harness.cache.file_bytes(&stable_url).await,
        Some(b"video-bytes".to_vec())
    );

    // Owner sync runs right after the completion write.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let media = harness.owners.media_for(&owner).await.unwrap();
    assert_eq!(media.url, stable_url);
    assert_eq!(media.duration_secs, Some(8.25));
    assert!(harness.store.get(&job.id).unwrap().unwrap().owner_synced);

    let submitted = harness.provider.submitted().await;
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].model.as_deref(), Some("mock-model-1"));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_job_times_out() {
    let harness = TestHarness::new();
    let orchestrator = harness.orchestrator(fixtures::fast_config(20, 150));
    orchestrator.start().await;

    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("never finishes")))
        .await
        .unwrap();

    let failed = harness.wait_for_status(&job.id, JobStatus::Failed).await;
    assert_eq!(failed.error_message.as_deref(), Some("timeout"));
    assert!(failed.stable_url.is_none());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_vendor_terminal_states_fail_the_job() {
    let harness = TestHarness::new();
    let orchestrator = harness.started().await;

    harness
        .provider
        .script("mock-task-1", vec![TaskSnapshot::expired()])
        .await;
    harness
        .provider
        .script(
            "mock-task-2",
            vec![TaskSnapshot::pending(), TaskSnapshot::failed("content policy")],
        )
        .await;
    harness
        .provider
        .script("mock-task-3", vec![TaskSnapshot::done("   ")])
        .await;

    let expired = orchestrator
        .submit(SubmitRequest::new(fixtures::video_payload("one")))
        .await
        .unwrap();
    let rejected = orchestrator
        .submit(SubmitRequest::new(fixtures::video_payload("two")))
        .await
        .unwrap();
    let empty = orchestrator
        .submit(SubmitRequest::new(fixtures::video_payload("three")))
        .await
        .unwrap();

    let job = harness.wait_for_status(&expired.id, JobStatus::Failed).await;
    assert_eq!(job.error_message.as_deref(), Some("task status expired"));

    let job = harness.wait_for_status(&rejected.id, JobStatus::Failed).await;
    assert_eq!(job.error_message.as_deref(), Some("content policy"));

    let job = harness.wait_for_status(&empty.id, JobStatus::Failed).await;
    assert_eq!(
        job.error_message.as_deref(),
        Some("task completed but no result URL")
    );

    assert_eq!(harness.cache.download_count().await, 0);
    orchestrator.stop().await;
}

#[tokio::test]
async fn test_cache_failure_degrades_to_vendor_url() {
    let harness = TestHarness::new();
    let vendor_url = "https://vendor.example/out/voice.mp3";
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url).with_duration(3.5))
        .await;
    harness.cache.set_fail_downloads(true).await;

    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("hello")))
        .await
        .unwrap();

    let done = harness.wait_for_status(&job.id, JobStatus::Completed).await;
    assert_eq!(done.stable_url.as_deref(), Some(vendor_url));
    assert_eq!(done.result_url.as_deref(), Some(vendor_url));
    assert!(!done.has_cache_link());
    assert_eq!(done.duration_secs, Some(3.5));
    assert!(harness.prober.probed().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_transient_query_errors_are_retried() {
    let harness = TestHarness::new();
    let vendor_url = "https://vendor.example/out/a.mp4";
    harness.cache.add_source(vendor_url, "bytes").await;
    harness.provider.fail_next_queries(3).await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url))
        .await;

    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::avatar_payload(
            "https://img/face.png",
            "https://cdn/line.mp3",
        )))
        .await
        .unwrap();

    let done = harness.wait_for_status(&job.id, JobStatus::Completed).await;
    assert!(done.stable_url.unwrap().starts_with("/static/avatars/"));
    assert!(harness.provider.query_count().await >= 4);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_voice_clone_skips_probe() {
    let harness = TestHarness::new();
    let vendor_url = "https://vendor.example/voices/speaker.json";
    harness.cache.add_source(vendor_url, "{}").await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url))
        .await;

    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::voice_clone_payload(
            "https://cdn/reference.wav",
        )))
        .await
        .unwrap();

    let done = harness.wait_for_status(&job.id, JobStatus::Completed).await;
    assert!(done.stable_url.unwrap().starts_with("/static/voices/"));
    assert!(done.duration_secs.is_none());
    assert!(harness.prober.probed().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_submit_error_fails_job_immediately() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_next_submit_error(ProviderError::Rejected("quota exceeded".to_string()))
        .await;

    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::merge_payload(&[
            "https://cdn/a.mp4",
            "https://cdn/b.mp4",
        ])))
        .await
        .unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.external_task_id.is_none());
    assert_eq!(
        job.error_message.as_deref(),
        Some("submit failed: rejected by provider: quota exceeded")
    );
    assert_eq!(harness.provider.query_count().await, 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_invalid_requests_create_no_job() {
    let harness = TestHarness::new();
    let orchestrator = harness.started().await;

    let err = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("  ")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    let mut mismatched = SubmitRequest::new(fixtures::tts_payload("hello"));
    mismatched.kind = JobKind::VideoRender;
    assert!(matches!(
        orchestrator.submit(mismatched).await,
        Err(OrchestratorError::Validation(_))
    ));

    let err = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("hello")).with_provider("nobody"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::NoProvider(_)));

    assert_eq!(orchestrator.status().await.pending_count, 0);
    assert!(harness.provider.submitted().await.is_empty());

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_cancelled_job_is_never_completed() {
    let harness = TestHarness::new();
    let vendor_url = "https://vendor.example/out/late.mp4";
    harness.cache.add_source(vendor_url, "late").await;

    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::video_payload("slow")))
        .await
        .unwrap();

    let cancelled = orchestrator.cancel(&job.id, "user request").await.unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert_eq!(cancelled.error_message.as_deref(), Some("user request"));

    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url))
        .await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = harness.store.get(&job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.stable_url.is_none());
    assert_eq!(harness.cache.download_count().await, 0);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_saturation_rejects_before_creating_job() {
    let harness = TestHarness::new();
    let config = OrchestratorConfig {
        max_concurrent_pollers: 1,
        max_queued_pollers: 1,
        ..fixtures::fast_config(20, 5_000)
    };
    let orchestrator = harness.orchestrator(config);
    orchestrator.start().await;

    for text in ["one", "two"] {
        orchestrator
            .submit(SubmitRequest::new(fixtures::tts_payload(text)))
            .await
            .unwrap();
    }
    let err = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("three")))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::Saturated));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let status = orchestrator.status().await;
    assert_eq!(status.processing_count, 2);
    assert_eq!(status.active_pollers, 1);
    assert_eq!(status.queued_pollers, 1);
    assert_eq!(harness.provider.submitted().await.len(), 2);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_stop_leaves_jobs_processing() {
    let harness = TestHarness::new();
    let orchestrator = harness.started().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("hello")))
        .await
        .unwrap();

    orchestrator.stop().await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done("https://vendor.example/a.mp3"))
        .await;
    tokio::time::sleep(Duration::from_millis(150)).await;

    let job = harness.store.get(&job.id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert!(matches!(
        orchestrator
            .submit(SubmitRequest::new(fixtures::tts_payload("late")))
            .await,
        Err(OrchestratorError::NotRunning)
    ));
}

#[tokio::test]
async fn test_slow_submit_is_bounded_by_submit_timeout() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_submit_delay(Duration::from_millis(1_200))
        .await;
    let config = OrchestratorConfig {
        query_timeout_secs: 1,
        submit_timeout_secs: 5,
        ..fixtures::fast_config(20, 5_000)
    };
    let orchestrator = harness.orchestrator(config);
    orchestrator.start().await;

    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("slow handoff")))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    assert_eq!(job.external_task_id.as_deref(), Some("mock-task-1"));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_restart_during_status_query_reattaches_poller() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_query_delay(Some(Duration::from_millis(300)))
        .await;
    let orchestrator = harness.orchestrator(fixtures::fast_config(20, 60_000));
    orchestrator.start().await;

    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("slow vendor")))
        .await
        .unwrap();

    // First query is in flight.
    tokio::time::sleep(Duration::from_millis(100)).await;
    orchestrator.stop().await;
    let status = orchestrator.status().await;
    assert_eq!(status.active_pollers, 0);
    assert_eq!(status.queued_pollers, 0);

    let report = orchestrator.start().await;
    assert_eq!(report.reattached, 1);
    assert_eq!(report.already_polling, 0);

    let vendor_url = "https://vendor.example/out/slow.mp3";
    harness.cache.add_source(vendor_url, "audio-bytes").await;
    harness.provider.set_query_delay(None).await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url))
        .await;

    let done = harness.wait_for_status(&job.id, JobStatus::Completed).await;
    assert_eq!(done.result_url.as_deref(), Some(vendor_url));

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_poller_started_after_stop_exits() {
    let harness = TestHarness::new();
    harness
        .provider
        .set_submit_delay(Duration::from_millis(200))
        .await;
    let orchestrator = Arc::new(harness.orchestrator(fixtures::fast_config(20, 60_000)));
    orchestrator.start().await;

    let submitting = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .submit(SubmitRequest::new(fixtures::tts_payload("racing stop")))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    orchestrator.stop().await;

    let job = submitting.await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(harness.provider.query_count().await, 0);
    assert_eq!(orchestrator.status().await.active_pollers, 0);

    let report = orchestrator.start().await;
    assert_eq!(report.reattached, 1);
    orchestrator.stop().await;
}

/// Job store whose next terminal writes fail like a locked database.
struct LockingStore {
    inner: SqliteJobStore,
    failing_completions: AtomicUsize,
    failing_failures: AtomicUsize,
}

impl LockingStore {
    fn new(dir: &TempDir, failing_completions: usize, failing_failures: usize) -> Self {
        Self {
            inner: SqliteJobStore::new(&dir.path().join("locking.db"))
                .expect("Failed to create job store"),
            failing_completions: AtomicUsize::new(failing_completions),
            failing_failures: AtomicUsize::new(failing_failures),
        }
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl JobStore for LockingStore {
    fn create(&self, request: CreateJobRequest) -> Result<JobRecord, JobError> {
        self.inner.create(request)
    }
    fn get(&self, id: &str) -> Result<Option<JobRecord>, JobError> {
        self.inner.get(id)
    }
    fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, JobError> {
        self.inner.list(filter)
    }
    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        self.inner.count(filter)
    }
    fn mark_processing(&self, id: &str, task_id: &str) -> Result<JobRecord, JobError> {
        self.inner.mark_processing(id, task_id)
    }
    fn mark_failed(&self, id: &str, message: &str) -> Result<JobRecord, JobError> {
        if Self::take(&self.failing_failures) {
            return Err(JobError::Database("database is locked".to_string()));
        }
        self.inner.mark_failed(id, message)
    }
    fn mark_cancelled(&self, id: &str, reason: &str) -> Result<JobRecord, JobError> {
        self.inner.mark_cancelled(id, reason)
    }
    fn mark_completed(
        &self,
        id: &str,
        completion: &JobCompletion,
    ) -> Result<JobRecord, JobError> {
        if Self::take(&self.failing_completions) {
            return Err(JobError::Database("database is locked".to_string()));
        }
        self.inner.mark_completed(id, completion)
    }
    fn rebind_stable_url(&self, id: &str, stable_url: &str) -> Result<JobRecord, JobError> {
        self.inner.rebind_stable_url(id, stable_url)
    }
    fn mark_owner_synced(&self, id: &str) -> Result<(), JobError> {
        self.inner.mark_owner_synced(id)
    }
    fn soft_delete(&self, id: &str) -> Result<JobRecord, JobError> {
        self.inner.soft_delete(id)
    }
    fn list_processing_with_task(&self) -> Result<Vec<JobRecord>, JobError> {
        self.inner.list_processing_with_task()
    }
    fn list_completed_missing_cache(&self) -> Result<Vec<JobRecord>, JobError> {
        self.inner.list_completed_missing_cache()
    }
    fn list_completed_with_stable_url(&self) -> Result<Vec<JobRecord>, JobError> {
        self.inner.list_completed_with_stable_url()
    }
    fn list_completed_unsynced_owner(&self) -> Result<Vec<JobRecord>, JobError> {
        self.inner.list_completed_unsynced_owner()
    }
    fn stable_url_in_use(&self, url: &str) -> Result<bool, JobError> {
        self.inner.stable_url_in_use(url)
    }
}

fn orchestrator_over(
    harness: &TestHarness,
    store: Arc<LockingStore>,
    config: OrchestratorConfig,
) -> JobOrchestrator {
    JobOrchestrator::new(
        config,
        store as Arc<dyn JobStore>,
        Arc::new(harness.registry()),
        Arc::clone(&harness.cache) as Arc<dyn CacheStore>,
        Arc::clone(&harness.owners) as Arc<dyn OwnerUpdater>,
    )
}

#[tokio::test]
async fn test_completion_write_error_is_retried() {
    let harness = TestHarness::new();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LockingStore::new(&dir, 1, 0));
    let vendor_url = "https://vendor.example/out/line.mp3";
    harness.cache.add_source(vendor_url, "audio-bytes").await;
    harness
        .provider
        .set_default_snapshot(TaskSnapshot::done(vendor_url))
        .await;

    let orchestrator = orchestrator_over(&harness, store.clone(), fixtures::fast_config(20, 5_000));
    orchestrator.start().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("locked once")))
        .await
        .unwrap();

    let done = wait_for_status(store.as_ref(), &job.id, JobStatus::Completed).await;
    assert!(done.has_cache_link());
    assert!(harness.provider.query_count().await >= 2);
    assert_eq!(harness.cache.download_count().await, 2);
    assert_eq!(harness.cache.file_count().await, 1);

    orchestrator.stop().await;
}

#[tokio::test]
async fn test_timeout_write_error_is_retried() {
    let harness = TestHarness::new();
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LockingStore::new(&dir, 0, 2));

    let orchestrator = orchestrator_over(&harness, store.clone(), fixtures::fast_config(20, 150));
    orchestrator.start().await;
    let job = orchestrator
        .submit(SubmitRequest::new(fixtures::tts_payload("never finishes")))
        .await
        .unwrap();

    let failed = wait_for_status(store.as_ref(), &job.id, JobStatus::Failed).await;
    assert_eq!(failed.error_message.as_deref(), Some("timeout"));

    orchestrator.stop().await;
}

// =============================================================================
// Speech synthesis against a vendor stub
// =============================================================================

#[derive(Clone)]
struct StubVendor {
    base: String,
    queries: Arc<AtomicUsize>,
}

async fn spawn_tts_vendor() -> String {
    async fn submit(Json(body): Json<Value>) -> Json<Value> {
        let speaker = body["req_params"]["speaker"].as_str().unwrap_or_default();
        if speaker.is_empty() {
            return Json(json!({"code": 40000001, "message": "speaker required"}));
        }
        Json(json!({"code": 20000000, "message": "ok", "data": {"task_id": "task-123"}}))
    }

    async fn query(State(vendor): State<StubVendor>, Json(body): Json<Value>) -> Json<Value> {
        if body["task_id"] != "task-123" {
            return Json(json!({"code": 45000001, "message": "task not exist"}));
        }
        if vendor.queries.fetch_add(1, Ordering::SeqCst) == 0 {
            return Json(json!({"code": 20000000, "data": {"task_id": "task-123", "task_status": 1}}));
        }
        Json(json!({
            "code": 20000000,
            "data": {
                "task_id": "task-123",
                "task_status": 2,
                "audio_url": format!("{}/files/task-123.mp3", vendor.base)
            }
        }))
    }

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let vendor = StubVendor {
        base: base.clone(),
        queries: Arc::new(AtomicUsize::new(0)),
    };

    let app = Router::new()
        .route("/api/v3/tts/submit", post(submit))
        .route("/api/v3/tts/query", post(query))
        .route("/files/task-123.mp3", get(|| async { "audio-bytes" }))
        .with_state(vendor);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

#[tokio::test]
async fn test_tts_job_against_vendor_stub() {
    let temp_dir = TempDir::new().unwrap();
    let base = spawn_tts_vendor().await;

    let tts = VolcengineTtsClient::new(VolcengineTtsConfig {
        app_id: "app-1".to_string(),
        access_key: "key-1".to_string(),
        resource_id: "volc.service_type.10029".to_string(),
        submit_url: format!("{}/api/v3/tts/submit", base),
        query_url: format!("{}/api/v3/tts/query", base),
        namespace: "BidirectionalTTS".to_string(),
        uid: "reelforge".to_string(),
        format: "mp3".to_string(),
        sample_rate: 24000,
        timeout_secs: 5,
    })
    .unwrap();
    let registry = ProviderRegistry::new()
        .register(Arc::new(tts))
        .with_default(JobKind::TtsSynthesis, "volcengine", None)
        .with_default_voice("zh_female_shuangkuaisisi_moon_bigtts");

    let store = Arc::new(SqliteJobStore::new(&temp_dir.path().join("jobs.db")).unwrap());
    let owners = Arc::new(SqliteOwnerMediaStore::new(&temp_dir.path().join("jobs.db")).unwrap());
    let cache = LocalCacheStore::new(
        temp_dir.path().join("static"),
        "/static",
        Duration::from_secs(5),
    )
    .unwrap();

    let orchestrator = JobOrchestrator::new(
        fixtures::fast_config(30, 5_000),
        Arc::clone(&store) as Arc<dyn JobStore>,
        Arc::new(registry),
        Arc::new(cache),
        Arc::clone(&owners) as Arc<dyn OwnerUpdater>,
    );
    orchestrator.start().await;

    let owner = OwnerRef::new(OwnerKind::Episode, "ep-7");
    let mut request = SubmitRequest::new(fixtures::tts_payload("你好，世界"));
    if let reelforge_core::JobPayload::TtsSynthesis(ref mut params) = request.payload {
        params.voice.clear();
    }
    let job = orchestrator
        .submit(request.with_owner(owner.clone()))
        .await
        .unwrap();
    assert_eq!(job.external_task_id.as_deref(), Some("task-123"));

    let done = wait_for_status(store.as_ref(), &job.id, JobStatus::Completed).await;
    let stable_url = done.stable_url.clone().unwrap();
    assert!(stable_url.starts_with("/static/audios/"));
    assert_eq!(
        done.result_url.as_deref(),
        Some(format!("{}/files/task-123.mp3", base).as_str())
    );

    let rel = stable_url.trim_start_matches("/static/");
    let bytes = std::fs::read(temp_dir.path().join("static").join(rel)).unwrap();
    assert_eq!(bytes, b"audio-bytes");

    tokio::time::sleep(Duration::from_millis(50)).await;
    let media = owners.get(&owner).unwrap().unwrap();
    assert_eq!(media.url, stable_url);

    orchestrator.stop().await;
}
