//! Filesystem cache served under a base URL.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StorageConfig;

use super::{cache_file_name, extension_from_url, parse_cache_timestamp};
use super::{CacheError, CacheStore, CachedFile, StoredMedia};

/// Path prefixes always accepted as pointing at the cache root.
const STATIC_PREFIXES: [&str; 2] = ["/static/", "static/"];

/// Cache rooted at a local directory.
pub struct LocalCacheStore {
    base_path: PathBuf,
    base_url: String,
    client: Client,
}

impl LocalCacheStore {
    pub fn new(
        base_path: impl Into<PathBuf>,
        base_url: impl Into<String>,
        download_timeout: Duration,
    ) -> Result<Self, CacheError> {
        let client = Client::builder()
            .timeout(download_timeout)
            .build()
            .map_err(|e| CacheError::Download(format!("http client: {}", e)))?;

        Ok(Self {
            base_path: base_path.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self, CacheError> {
        Self::new(
            config.base_path.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.download_timeout_secs),
        )
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn stable_url_for(&self, category: &str, file_name: &str) -> String {
        format!("{}/{}/{}", self.base_url, category, file_name)
    }

    /// Relative path inside the cache for a URL, if it points here.
    fn relative_path(&self, url: &str) -> Option<String> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        if let Some(rest) = url
            .strip_prefix(self.base_url.as_str())
            .and_then(|r| r.strip_prefix('/'))
        {
            return Some(rest.to_string());
        }

        let path = match Url::parse(url) {
            Ok(parsed) => {
                let loopback = matches!(
                    parsed.host_str(),
                    Some("localhost") | Some("127.0.0.1") | Some("[::1]") | Some("::1")
                );
                if !loopback {
                    return None;
                }
                parsed.path().to_string()
            }
            Err(_) => url.to_string(),
        };

        if let Ok(base) = Url::parse(&self.base_url) {
            let base_path = base.path().trim_end_matches('/');
            if !base_path.is_empty() {
                if let Some(rest) = path
                    .strip_prefix(base_path)
                    .and_then(|r| r.strip_prefix('/'))
                {
                    return Some(rest.to_string());
                }
            }
        }

        STATIC_PREFIXES
            .iter()
            .find_map(|prefix| path.strip_prefix(prefix))
            .map(str::to_string)
    }

    async fn download_to(&self, url: &str, dest: &Path) -> Result<u64, CacheError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| CacheError::Download(e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        Ok(written)
    }
}

#[async_trait]
impl CacheStore for LocalCacheStore {
    async fn store(&self, source_url: &str, category: &str) -> Result<StoredMedia, CacheError> {
        let source_url = source_url.trim();
        let parsed =
            Url::parse(source_url).map_err(|_| CacheError::InvalidUrl(source_url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CacheError::InvalidUrl(source_url.to_string()));
        }

        let dir = self.base_path.join(category);
        tokio::fs::create_dir_all(&dir).await?;

        let part_path = dir.join(format!("{}.part", Uuid::new_v4().simple()));

        let size_bytes = match self.download_to(source_url, &part_path).await {
            Ok(size) => size,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(e);
            }
        };

        // Named once the bytes are in, so the timestamp tracks completion.
        let file_name = cache_file_name(Utc::now(), &extension_from_url(source_url));
        let final_path = dir.join(&file_name);
        if let Err(e) = tokio::fs::rename(&part_path, &final_path).await {
            let _ = tokio::fs::remove_file(&part_path).await;
            return Err(e.into());
        }

        let stable_url = self.stable_url_for(category, &file_name);
        info!(
            "Cached {} bytes from {} as {}",
            size_bytes, source_url, stable_url
        );

        Ok(StoredMedia {
            stable_url,
            path: final_path,
            size_bytes,
        })
    }

    fn resolve(&self, stable_url: &str) -> Option<PathBuf> {
        let rel = self.relative_path(stable_url)?;
        let rel = rel.split(['?', '#']).next().unwrap_or_default();

        let rel_path = Path::new(rel);
        if rel.is_empty()
            || !rel_path
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
        {
            debug!("Rejected cache URL {}", stable_url);
            return None;
        }

        Some(self.base_path.join(rel_path))
    }

    async fn scan(&self, category: &str) -> Result<Vec<CachedFile>, CacheError> {
        let dir = self.base_path.join(category);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(cached_at) = parse_cache_timestamp(&file_name) else {
                continue;
            };
            files.push(CachedFile {
                stable_url: self.stable_url_for(category, &file_name),
                path: entry.path(),
                file_name,
                cached_at,
            });
        }

        files.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(files)
    }
}
