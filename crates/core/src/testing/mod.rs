//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the orchestrator's
//! collaborators, so job lifecycles can be tested end to end without vendor
//! accounts, a media cache on disk or ffprobe.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelforge_core::testing::{MockCacheStore, MockOwnerUpdater, MockProviderClient};
//!
//! let provider = MockProviderClient::new("mock");
//! let cache = MockCacheStore::new();
//!
//! // Configure mock responses
//! provider.set_default_snapshot(TaskSnapshot::done("https://cdn/a.mp4")).await;
//! cache.add_source("https://cdn/a.mp4", "video-bytes").await;
//! ```

mod mock_cache;
mod mock_owner;
mod mock_prober;
mod mock_provider;

pub use mock_cache::MockCacheStore;
pub use mock_owner::MockOwnerUpdater;
pub use mock_prober::MockProber;
pub use mock_provider::{MockProviderClient, RecordedSubmit};

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::job::{
        AvatarRenderParams, JobCompletion, JobKind, JobPayload, TtsSynthesisParams,
        VideoMergeParams, VideoRenderParams, VoiceCloneParams,
    };
    use crate::orchestrator::{KindPolicy, OrchestratorConfig};

    /// A TTS payload with a voice set.
    pub fn tts_payload(text: &str) -> JobPayload {
        JobPayload::TtsSynthesis(TtsSynthesisParams {
            text: text.to_string(),
            voice: "zh_female_shuangkuaisisi_moon_bigtts".to_string(),
            resource_id: None,
        })
    }

    /// A text-to-video payload.
    pub fn video_payload(prompt: &str) -> JobPayload {
        JobPayload::VideoRender(VideoRenderParams {
            prompt: prompt.to_string(),
            ..Default::default()
        })
    }

    /// An avatar payload driven by an existing audio track.
    pub fn avatar_payload(image_url: &str, audio_url: &str) -> JobPayload {
        JobPayload::AvatarRender(AvatarRenderParams {
            image_url: image_url.to_string(),
            audio_url: Some(audio_url.to_string()),
            ..Default::default()
        })
    }

    pub fn voice_clone_payload(audio_url: &str) -> JobPayload {
        JobPayload::VoiceClone(VoiceCloneParams {
            audio_url: audio_url.to_string(),
            speaker_name: None,
        })
    }

    pub fn merge_payload(clip_urls: &[&str]) -> JobPayload {
        JobPayload::VideoMerge(VideoMergeParams {
            clip_urls: clip_urls.iter().map(|u| u.to_string()).collect(),
            audio_urls: Vec::new(),
        })
    }

    /// A completion with distinct vendor and stable URLs.
    pub fn completion(result_url: &str, stable_url: &str) -> JobCompletion {
        JobCompletion {
            result_url: result_url.to_string(),
            stable_url: stable_url.to_string(),
            duration_secs: None,
        }
    }

    /// Orchestrator config that polls every kind quickly.
    pub fn fast_config(poll_interval_ms: u64, max_wait_ms: u64) -> OrchestratorConfig {
        let policy = KindPolicy::new(
            std::time::Duration::from_millis(poll_interval_ms),
            std::time::Duration::from_millis(max_wait_ms),
        );
        JobKind::ALL
            .iter()
            .fold(OrchestratorConfig::default(), |config, kind| {
                config.with_policy(*kind, policy)
            })
    }

    /// Parse an RFC 3339 timestamp.
    pub fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }
}
