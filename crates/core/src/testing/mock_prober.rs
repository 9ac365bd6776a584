//! Mock media prober for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::probe::{MediaProber, ProbeError};

/// Mock implementation of the MediaProber trait.
///
/// Answers every probe with a fixed duration, or fails when none is set.
#[derive(Debug, Default)]
pub struct MockProber {
    duration: Arc<RwLock<Option<f64>>>,
    probed: Arc<RwLock<Vec<PathBuf>>>,
}

impl MockProber {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration: Arc::new(RwLock::new(Some(duration_secs))),
            probed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// A prober that always fails.
    pub fn failing() -> Self {
        Self::default()
    }

    /// Paths probed so far.
    pub async fn probed(&self) -> Vec<PathBuf> {
        self.probed.read().await.clone()
    }
}

#[async_trait]
impl MediaProber for MockProber {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError> {
        self.probed.write().await.push(path.to_path_buf());
        let duration = *self.duration.read().await;
        duration.ok_or_else(|| ProbeError::probe_failed("mock probe failure"))
    }
}
