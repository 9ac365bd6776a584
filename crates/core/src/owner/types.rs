//! Owning-entity references.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::job::ParseLabelError;

/// Kind of entity whose media fields mirror a job's stable URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    /// Storyboard shot: video, avatar or line audio.
    Storyboard,
    /// Episode: merged final cut.
    Episode,
    /// User voice produced by cloning.
    CustomVoice,
    /// Character: voice preview sample.
    Character,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Storyboard => "storyboard",
            OwnerKind::Episode => "episode",
            OwnerKind::CustomVoice => "custom_voice",
            OwnerKind::Character => "character",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnerKind {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storyboard" => Ok(OwnerKind::Storyboard),
            "episode" => Ok(OwnerKind::Episode),
            "custom_voice" => Ok(OwnerKind::CustomVoice),
            "character" => Ok(OwnerKind::Character),
            other => Err(ParseLabelError {
                what: "owner kind",
                value: other.to_string(),
            }),
        }
    }
}

/// Pointer from a job to the entity it produces media for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub id: String,
}

impl OwnerRef {
    pub fn new(kind: OwnerKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

impl fmt::Display for OwnerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Media fields written onto an owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerMedia {
    pub url: String,
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Error)]
pub enum OwnerError {
    #[error("owner not found: {0}")]
    NotFound(OwnerRef),

    #[error("owner store error: {0}")]
    Storage(String),
}
