//! Cache file names.
//!
//! Files are named `YYYYMMDD_HHMMSS_mmm_<8 hex>.<ext>` (UTC). The time prefix
//! lets recovery match orphaned files to jobs by completion time.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex_lite::Regex;

use super::CachedFile;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

static CACHE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{8}_\d{6}_\d{3})_[0-9a-f]{8}\.[A-Za-z0-9]{1,8}$")
        .expect("cache name pattern is valid")
});

/// Build a cache file name for an artifact cached at `at`.
pub fn cache_file_name(at: DateTime<Utc>, extension: &str) -> String {
    let token = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}.{}",
        at.format(TIMESTAMP_FORMAT),
        &token[..8],
        extension
    )
}

/// Time encoded in a cache file name, if it follows the naming scheme.
pub fn parse_cache_timestamp(file_name: &str) -> Option<DateTime<Utc>> {
    let caps = CACHE_NAME.captures(file_name)?;
    NaiveDateTime::parse_from_str(caps.get(1)?.as_str(), TIMESTAMP_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// File extension for a downloaded URL, from the last path segment.
/// Falls back to `bin`.
pub fn extension_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    segment
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .unwrap_or_else(|| "bin".to_string())
}

/// Files whose encoded time lies within `window` of `target`, closest first.
pub fn closest_within(
    files: &[CachedFile],
    target: DateTime<Utc>,
    window: chrono::Duration,
) -> Vec<&CachedFile> {
    let mut hits: Vec<(chrono::Duration, &CachedFile)> = files
        .iter()
        .map(|f| ((f.cached_at - target).abs(), f))
        .filter(|(delta, _)| *delta <= window)
        .collect();
    hits.sort_by_key(|(delta, f)| (*delta, f.file_name.clone()));
    hits.into_iter().map(|(_, f)| f).collect()
}
