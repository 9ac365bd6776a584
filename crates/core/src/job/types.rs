//! Job record types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::owner::OwnerRef;

/// Capability a job exercises. Each kind has exactly one entry in the
/// orchestrator's policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Image/text to video rendering.
    VideoRender,
    /// Digital-human avatar rendering from a portrait and speech.
    AvatarRender,
    /// Text-to-speech synthesis.
    TtsSynthesis,
    /// Voice cloning from a reference recording.
    VoiceClone,
    /// Server-side merge of episode clips.
    VideoMerge,
}

impl JobKind {
    /// Every kind, in a stable order.
    pub const ALL: [JobKind; 5] = [
        JobKind::VideoRender,
        JobKind::AvatarRender,
        JobKind::TtsSynthesis,
        JobKind::VoiceClone,
        JobKind::VideoMerge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::VideoRender => "video_render",
            JobKind::AvatarRender => "avatar_render",
            JobKind::TtsSynthesis => "tts_synthesis",
            JobKind::VoiceClone => "voice_clone",
            JobKind::VideoMerge => "video_merge",
        }
    }

    /// Directory under the cache root where this kind's artifacts live.
    pub fn cache_category(&self) -> &'static str {
        match self {
            JobKind::VideoRender => "videos",
            JobKind::AvatarRender => "avatars",
            JobKind::TtsSynthesis => "audios",
            JobKind::VoiceClone => "voices",
            JobKind::VideoMerge => "merged",
        }
    }

    /// Whether the artifact is timed media whose true duration should be probed
    /// from the cached file after completion.
    pub fn probes_duration(&self) -> bool {
        match self {
            JobKind::VideoRender
            | JobKind::AvatarRender
            | JobKind::TtsSynthesis
            | JobKind::VideoMerge => true,
            JobKind::VoiceClone => false,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unknown enum labels read back from storage or requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {what}: {value}")]
pub struct ParseLabelError {
    pub what: &'static str,
    pub value: String,
}

impl FromStr for JobKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseLabelError {
                what: "job kind",
                value: s.to_string(),
            })
    }
}

/// Lifecycle state of a job record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Record exists, vendor submission has not returned yet.
    Pending,
    /// Vendor accepted the task; a poller owns the record.
    Processing,
    Completed,
    Failed,
    /// Forced terminal state set from outside the poller.
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Allowed edges of the job state machine.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (
                JobStatus::Pending,
                JobStatus::Processing | JobStatus::Failed | JobStatus::Cancelled
            ) | (
                JobStatus::Processing,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
            )
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ParseLabelError {
                what: "job status",
                value: other.to_string(),
            }),
        }
    }
}

/// Rejected submission input. No job is created when this is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("payload is for {payload} but job kind is {kind}")]
    KindMismatch { kind: JobKind, payload: JobKind },

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Video rendering request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoRenderParams {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_frame_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_frame_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<String>,
}

/// Digital-human rendering request. Speech comes either from a ready audio
/// track or from text plus a voice to synthesize it with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarRenderParams {
    pub image_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsSynthesisParams {
    pub text: String,
    pub voice: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceCloneParams {
    pub audio_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoMergeParams {
    pub clip_urls: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub audio_urls: Vec<String>,
}

/// Typed request payload, one variant per [`JobKind`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum JobPayload {
    VideoRender(VideoRenderParams),
    AvatarRender(AvatarRenderParams),
    TtsSynthesis(TtsSynthesisParams),
    VoiceClone(VoiceCloneParams),
    VideoMerge(VideoMergeParams),
}

fn blank(value: &str) -> bool {
    value.trim().is_empty()
}

fn blank_opt(value: &Option<String>) -> bool {
    value.as_deref().map(blank).unwrap_or(true)
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::VideoRender(_) => JobKind::VideoRender,
            JobPayload::AvatarRender(_) => JobKind::AvatarRender,
            JobPayload::TtsSynthesis(_) => JobKind::TtsSynthesis,
            JobPayload::VoiceClone(_) => JobKind::VoiceClone,
            JobPayload::VideoMerge(_) => JobKind::VideoMerge,
        }
    }

    /// Check the fields `kind` requires.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            JobPayload::VideoRender(p) => {
                if blank(&p.prompt) {
                    return Err(ValidationError::MissingField("prompt"));
                }
                if p.reference_image_urls.iter().any(|u| blank(u)) {
                    return Err(ValidationError::InvalidField {
                        field: "reference_image_urls",
                        reason: "contains an empty URL".to_string(),
                    });
                }
                if p.duration_secs == Some(0) {
                    return Err(ValidationError::InvalidField {
                        field: "duration_secs",
                        reason: "must be positive".to_string(),
                    });
                }
            }
            JobPayload::AvatarRender(p) => {
                if blank(&p.image_url) {
                    return Err(ValidationError::MissingField("image_url"));
                }
                if blank_opt(&p.audio_url) {
                    if blank_opt(&p.speech_text) {
                        return Err(ValidationError::MissingField("audio_url or speech_text"));
                    }
                    if blank_opt(&p.voice) {
                        return Err(ValidationError::MissingField("voice"));
                    }
                }
            }
            JobPayload::TtsSynthesis(p) => {
                if blank(&p.text) {
                    return Err(ValidationError::MissingField("text"));
                }
                if blank(&p.voice) {
                    return Err(ValidationError::MissingField("voice"));
                }
            }
            JobPayload::VoiceClone(p) => {
                if blank(&p.audio_url) {
                    return Err(ValidationError::MissingField("audio_url"));
                }
            }
            JobPayload::VideoMerge(p) => {
                if p.clip_urls.is_empty() {
                    return Err(ValidationError::MissingField("clip_urls"));
                }
                if p.clip_urls.iter().any(|u| blank(u)) {
                    return Err(ValidationError::InvalidField {
                        field: "clip_urls",
                        reason: "contains an empty URL".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Persisted state of one orchestrated unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub kind: JobKind,
    pub provider: String,
    pub model: Option<String>,
    pub payload: JobPayload,
    /// Vendor handle. Set once by a successful submission.
    pub external_task_id: Option<String>,
    pub status: JobStatus,
    /// Vendor-origin artifact URL. May expire.
    pub result_url: Option<String>,
    /// URL readers should use. Points into the local cache unless caching failed.
    pub stable_url: Option<String>,
    pub duration_secs: Option<f64>,
    pub error_message: Option<String>,
    pub owner: Option<OwnerRef>,
    /// Whether the owner's media fields currently mirror `stable_url`.
    pub owner_synced: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// True when `stable_url` is set and differs from the vendor URL.
    pub fn has_cache_link(&self) -> bool {
        match (&self.stable_url, &self.result_url) {
            (Some(stable), Some(result)) => !stable.is_empty() && stable != result,
            (Some(stable), None) => !stable.is_empty(),
            (None, _) => false,
        }
    }
}

/// Fields written when a job completes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobCompletion {
    pub result_url: String,
    pub stable_url: String,
    pub duration_secs: Option<f64>,
}
