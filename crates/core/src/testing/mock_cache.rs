//! In-memory media cache for testing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::cache::{
    cache_file_name, extension_from_url, parse_cache_timestamp, CacheError, CacheStore,
    CachedFile, StoredMedia,
};

const BASE_URL: &str = "/static";
const ROOT: &str = "/mock-cache";

#[derive(Debug, Clone)]
struct MockFile {
    category: String,
    file_name: String,
    cached_at: DateTime<Utc>,
    bytes: Vec<u8>,
}

/// Mock implementation of the CacheStore trait.
///
/// Downloads are served from registered sources; unknown URLs fail with
/// HTTP 404. Stable URLs look like `/static/<category>/<file>` and resolve
/// under `/mock-cache`, but nothing touches the filesystem.
#[derive(Debug, Default)]
pub struct MockCacheStore {
    sources: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    files: Arc<RwLock<HashMap<String, MockFile>>>,
    fail_downloads: Arc<RwLock<bool>>,
    download_count: Arc<RwLock<u32>>,
}

impl MockCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `url` downloadable with the given body.
    pub async fn add_source(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.sources
            .write()
            .await
            .insert(url.to_string(), bytes.into());
    }

    /// Make `url` fail from now on.
    pub async fn remove_source(&self, url: &str) {
        self.sources.write().await.remove(url);
    }

    /// Fail every download regardless of sources.
    pub async fn set_fail_downloads(&self, fail: bool) {
        *self.fail_downloads.write().await = fail;
    }

    /// Place a file as if it had been cached at `cached_at`. Returns its stable URL.
    pub async fn put_file(
        &self,
        category: &str,
        cached_at: DateTime<Utc>,
        extension: &str,
    ) -> String {
        let file_name = cache_file_name(cached_at, extension);
        let stable_url = stable_url(category, &file_name);
        self.files.write().await.insert(
            stable_url.clone(),
            MockFile {
                category: category.to_string(),
                file_name,
                cached_at,
                bytes: Vec::new(),
            },
        );
        stable_url
    }

    /// Lose a cached file.
    pub async fn delete_file(&self, stable_url: &str) {
        self.files.write().await.remove(stable_url);
    }

    /// Body of a cached file.
    pub async fn file_bytes(&self, stable_url: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .await
            .get(stable_url)
            .map(|f| f.bytes.clone())
    }

    pub async fn file_count(&self) -> usize {
        self.files.read().await.len()
    }

    /// Number of download attempts, failed ones included.
    pub async fn download_count(&self) -> u32 {
        *self.download_count.read().await
    }
}

fn stable_url(category: &str, file_name: &str) -> String {
    format!("{}/{}/{}", BASE_URL, category, file_name)
}

#[async_trait]
impl CacheStore for MockCacheStore {
    async fn store(&self, source_url: &str, category: &str) -> Result<StoredMedia, CacheError> {
        *self.download_count.write().await += 1;

        if *self.fail_downloads.read().await {
            return Err(CacheError::Download("mock download failure".to_string()));
        }

        let bytes = self
            .sources
            .read()
            .await
            .get(source_url)
            .cloned()
            .ok_or_else(|| CacheError::Http {
                url: source_url.to_string(),
                status: 404,
            })?;

        let cached_at = Utc::now();
        let file_name = cache_file_name(cached_at, &extension_from_url(source_url));
        let stable_url = stable_url(category, &file_name);
        let size_bytes = bytes.len() as u64;

        self.files.write().await.insert(
            stable_url.clone(),
            MockFile {
                category: category.to_string(),
                file_name: file_name.clone(),
                cached_at,
                bytes,
            },
        );

        Ok(StoredMedia {
            path: Path::new(ROOT).join(category).join(&file_name),
            stable_url,
            size_bytes,
        })
    }

    fn resolve(&self, stable_url: &str) -> Option<PathBuf> {
        let rel = stable_url.strip_prefix(BASE_URL)?.strip_prefix('/')?;
        let rel_path = Path::new(rel);
        if rel.is_empty()
            || !rel_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            return None;
        }
        Some(Path::new(ROOT).join(rel_path))
    }

    async fn scan(&self, category: &str) -> Result<Vec<CachedFile>, CacheError> {
        let mut files: Vec<CachedFile> = self
            .files
            .read()
            .await
            .iter()
            .filter(|(_, f)| f.category == category)
            .filter(|(_, f)| parse_cache_timestamp(&f.file_name).is_some())
            .map(|(url, f)| CachedFile {
                file_name: f.file_name.clone(),
                path: Path::new(ROOT).join(category).join(&f.file_name),
                stable_url: url.clone(),
                cached_at: f.cached_at,
            })
            .collect();
        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }

    async fn contains(&self, stable_url: &str) -> bool {
        self.files.read().await.contains_key(stable_url)
    }

    async fn remove(&self, stable_url: &str) -> Result<(), CacheError> {
        self.files.write().await.remove(stable_url);
        Ok(())
    }
}
