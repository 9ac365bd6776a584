//! Local media cache.
//!
//! Vendor result URLs expire. Every artifact is copied into a category
//! directory under the cache root and readers are handed a stable URL that
//! maps back onto that file.

mod local;
mod naming;

pub use local::LocalCacheStore;
pub use naming::{cache_file_name, closest_within, extension_from_url, parse_cache_timestamp};

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("download failed: {0}")]
    Download(String),

    #[error("download of {url} returned HTTP {status}")]
    Http { url: String, status: u16 },

    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// A freshly cached artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMedia {
    pub stable_url: String,
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// A file found by scanning a category directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedFile {
    pub file_name: String,
    pub path: PathBuf,
    pub stable_url: String,
    /// Time encoded in the file name.
    pub cached_at: DateTime<Utc>,
}

/// Durable storage for fetched artifacts.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch `source_url` into `category` and return its stable URL.
    async fn store(&self, source_url: &str, category: &str) -> Result<StoredMedia, CacheError>;

    /// Map a stable URL back to its path under the cache root. `None` when the
    /// URL does not point into this cache.
    fn resolve(&self, stable_url: &str) -> Option<PathBuf>;

    /// Cache files in `category`, oldest first.
    async fn scan(&self, category: &str) -> Result<Vec<CachedFile>, CacheError>;

    /// Whether the file behind `stable_url` is present.
    async fn contains(&self, stable_url: &str) -> bool {
        match self.resolve(stable_url) {
            Some(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            None => false,
        }
    }

    /// Delete the file behind `stable_url`. A missing file is not an error.
    async fn remove(&self, stable_url: &str) -> Result<(), CacheError> {
        let Some(path) = self.resolve(stable_url) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
