//! Common test utilities for API testing with mocks.
//!
//! The fixture builds the real router over a real orchestrator and SQLite job
//! store, with the vendor, media cache and owner side replaced by mocks.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use reelforge_core::{
    config::DatabaseConfig,
    testing::{MockCacheStore, MockOwnerUpdater, MockProviderClient},
    CacheStore, Config, JobKind, JobOrchestrator, JobStore, OrchestratorConfig,
    OwnerUpdater, ProviderRegistry, SqliteJobStore,
};
use reelforge_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use reelforge_core::testing::fixtures;

/// In-process server with controllable collaborators.
pub struct TestFixture {
    pub router: Router,
    pub orchestrator: Arc<JobOrchestrator>,
    pub store: Arc<SqliteJobStore>,
    /// Vendor for every kind, registered as "mock"
    pub provider: Arc<MockProviderClient>,
    pub cache: Arc<MockCacheStore>,
    pub owners: Arc<MockOwnerUpdater>,
    /// Holds the database and the served cache directory
    pub temp_dir: TempDir,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Fixture options
pub struct TestConfig {
    pub orchestrator: OrchestratorConfig,
    /// Start the orchestrator before returning the fixture.
    pub start: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            orchestrator: fixtures::fast_config(20, 5_000),
            start: true,
        }
    }
}

impl TestFixture {
    /// Create a new test fixture with a running orchestrator.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture whose orchestrator was never started.
    pub async fn stopped() -> Self {
        Self::with_config(TestConfig {
            start: false,
            ..Default::default()
        })
        .await
    }

    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let static_dir = temp_dir.path().join("static");
        std::fs::create_dir_all(&static_dir).expect("Failed to create static dir");

        let mut config = Config {
            database: DatabaseConfig {
                path: db_path.clone(),
            },
            orchestrator: test_config.orchestrator.clone(),
            ..Default::default()
        };
        config.storage.base_path = static_dir;
        config.storage.base_url = "/static".to_string();

        let store = Arc::new(SqliteJobStore::new(&db_path).expect("Failed to create job store"));
        let provider = Arc::new(MockProviderClient::new("mock"));
        let cache = Arc::new(MockCacheStore::new());
        let owners = Arc::new(MockOwnerUpdater::new());

        let registry = JobKind::ALL.iter().fold(
            ProviderRegistry::new().register(provider.clone()),
            |registry, kind| registry.with_default(*kind, "mock", None),
        );

        let orchestrator = Arc::new(JobOrchestrator::new(
            test_config.orchestrator,
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(registry),
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::clone(&owners) as Arc<dyn OwnerUpdater>,
        ));
        if test_config.start {
            orchestrator.start().await;
        }

        let state = Arc::new(AppState::new(config, Arc::clone(&orchestrator)));
        let router = create_router(state);

        Self {
            router,
            orchestrator,
            store,
            provider,
            cache,
            owners,
            temp_dir,
        }
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        TestResponse {
            status,
            body: parse_body(&bytes),
        }
    }

    /// GET returning the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// Poll a job over the API until it reaches `status`.
    pub async fn wait_for_status(&self, job_id: &str, status: &str) -> Value {
        let start = std::time::Instant::now();
        loop {
            let response = self.get(&format!("/api/v1/jobs/{}", job_id)).await;
            assert_eq!(response.status, StatusCode::OK);
            if response.body["status"] == status {
                return response.body;
            }
            if start.elapsed() > std::time::Duration::from_secs(5) {
                panic!(
                    "Job {} stuck in {} while waiting for {}",
                    job_id, response.body["status"], status
                );
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = match body {
            Some(json) => {
                request_builder = request_builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_string(&json).unwrap())
            }
            None => Body::empty(),
        };

        let request = request_builder.body(body).unwrap();
        let (status, bytes) = self.send(request).await;
        TestResponse {
            status,
            body: parse_body(&bytes),
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        (status, body_bytes.to_vec())
    }
}

fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(bytes).unwrap_or(Value::Null)
    }
}
