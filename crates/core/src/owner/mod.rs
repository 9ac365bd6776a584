//! Owning-entity updates.
//!
//! Each completed job mirrors its stable URL (and probed duration) onto the
//! entity that requested it. Writes are idempotent so the recovery sweep can
//! replay them after a crash between the job update and the owner update.

mod sqlite;
mod types;

pub use sqlite::SqliteOwnerMediaStore;
pub use types::{OwnerError, OwnerKind, OwnerMedia, OwnerRef};

use async_trait::async_trait;

/// Writes media fields onto owning entities.
#[async_trait]
pub trait OwnerUpdater: Send + Sync {
    /// Set the owner's media to `media`. Repeating the same call is a no-op.
    async fn set_media(&self, owner: &OwnerRef, media: &OwnerMedia) -> Result<(), OwnerError>;
}
