//! Media duration probing.

mod ffprobe;

pub use ffprobe::FfprobeProber;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("ffprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    #[error("input file not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }
}

/// Reads the authoritative duration of a cached media file.
#[async_trait]
pub trait MediaProber: Send + Sync {
    async fn duration_secs(&self, path: &Path) -> Result<f64, ProbeError>;
}
