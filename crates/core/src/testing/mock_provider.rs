//! Mock vendor backend for testing.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::job::{JobKind, JobPayload};
use crate::provider::{ProviderClient, ProviderError, TaskSnapshot};

/// A recorded submission for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedSubmit {
    pub kind: JobKind,
    pub model: Option<String>,
    pub payload: JobPayload,
    /// Task id handed back to the caller.
    pub task_id: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Mock implementation of the ProviderClient trait.
///
/// Task ids are `mock-task-1`, `mock-task-2`, ... in submission order.
/// Status answers come from a per-task script; the last scripted snapshot
/// repeats. Tasks without a script answer with the default snapshot
/// (pending unless changed).
///
/// # Example
///
/// ```rust,ignore
/// let provider = MockProviderClient::new("mock");
/// provider.set_default_snapshot(TaskSnapshot::done("https://cdn/a.mp4")).await;
///
/// let task_id = provider.submit(JobKind::VideoRender, None, &payload).await?;
/// assert_eq!(task_id, "mock-task-1");
/// ```
#[derive(Debug)]
pub struct MockProviderClient {
    name: String,
    kinds: Vec<JobKind>,
    submitted: Arc<RwLock<Vec<RecordedSubmit>>>,
    scripts: Arc<RwLock<HashMap<String, VecDeque<TaskSnapshot>>>>,
    default_snapshot: Arc<RwLock<TaskSnapshot>>,
    next_submit_error: Arc<RwLock<Option<ProviderError>>>,
    /// Number of upcoming queries that fail with a transport error.
    failing_queries: Arc<RwLock<u32>>,
    submit_delay: Arc<RwLock<Option<Duration>>>,
    query_delay: Arc<RwLock<Option<Duration>>>,
    query_count: Arc<RwLock<u32>>,
    task_counter: Arc<RwLock<u32>>,
}

impl MockProviderClient {
    /// Create a mock provider that supports every job kind.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kinds: JobKind::ALL.to_vec(),
            submitted: Arc::new(RwLock::new(Vec::new())),
            scripts: Arc::new(RwLock::new(HashMap::new())),
            default_snapshot: Arc::new(RwLock::new(TaskSnapshot::pending())),
            next_submit_error: Arc::new(RwLock::new(None)),
            failing_queries: Arc::new(RwLock::new(0)),
            submit_delay: Arc::new(RwLock::new(None)),
            query_delay: Arc::new(RwLock::new(None)),
            query_count: Arc::new(RwLock::new(0)),
            task_counter: Arc::new(RwLock::new(0)),
        }
    }

    /// Restrict the kinds this provider accepts.
    pub fn with_kinds(mut self, kinds: Vec<JobKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Script the answers for one task.
    pub async fn script(&self, task_id: &str, snapshots: Vec<TaskSnapshot>) {
        self.scripts
            .write()
            .await
            .insert(task_id.to_string(), snapshots.into());
    }

    /// Answer for tasks without a script.
    pub async fn set_default_snapshot(&self, snapshot: TaskSnapshot) {
        *self.default_snapshot.write().await = snapshot;
    }

    /// Configure the next submit to fail with the given error.
    pub async fn set_next_submit_error(&self, error: ProviderError) {
        *self.next_submit_error.write().await = Some(error);
    }

    /// Fail the next `count` status queries.
    pub async fn fail_next_queries(&self, count: u32) {
        *self.failing_queries.write().await = count;
    }

    /// Delay every submit by `delay`.
    pub async fn set_submit_delay(&self, delay: Duration) {
        *self.submit_delay.write().await = Some(delay);
    }

    /// Delay every status query by `delay`; `None` answers at once.
    pub async fn set_query_delay(&self, delay: Option<Duration>) {
        *self.query_delay.write().await = delay;
    }

    /// Get all recorded submissions.
    pub async fn submitted(&self) -> Vec<RecordedSubmit> {
        self.submitted.read().await.clone()
    }

    /// Number of status queries answered or failed so far.
    pub async fn query_count(&self) -> u32 {
        *self.query_count.read().await
    }

    async fn next_task_id(&self) -> String {
        let mut counter = self.task_counter.write().await;
        *counter += 1;
        format!("mock-task-{}", *counter)
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, kind: JobKind) -> bool {
        self.kinds.contains(&kind)
    }

    async fn submit(
        &self,
        kind: JobKind,
        model: Option<&str>,
        payload: &JobPayload,
    ) -> Result<String, ProviderError> {
        let delay = *self.submit_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(err) = self.next_submit_error.write().await.take() {
            return Err(err);
        }

        let task_id = self.next_task_id().await;
        self.submitted.write().await.push(RecordedSubmit {
            kind,
            model: model.map(str::to_string),
            payload: payload.clone(),
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        });
        Ok(task_id)
    }

    async fn query(&self, _kind: JobKind, task_id: &str) -> Result<TaskSnapshot, ProviderError> {
        *self.query_count.write().await += 1;

        let delay = *self.query_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failing = self.failing_queries.write().await;
            if *failing > 0 {
                *failing -= 1;
                return Err(ProviderError::Transport("mock connection reset".to_string()));
            }
        }

        let mut scripts = self.scripts.write().await;
        match scripts.get_mut(task_id) {
            Some(queue) if queue.len() > 1 => {
                Ok(queue.pop_front().unwrap_or_else(TaskSnapshot::pending))
            }
            Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
            _ => Ok(self.default_snapshot.read().await.clone()),
        }
    }
}
