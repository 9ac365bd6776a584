//! Mock owner updater for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::owner::{OwnerError, OwnerMedia, OwnerRef, OwnerUpdater};

/// Mock implementation of the OwnerUpdater trait.
///
/// Records every successful update; can be switched to fail.
#[derive(Debug, Default)]
pub struct MockOwnerUpdater {
    updates: Arc<RwLock<Vec<(OwnerRef, OwnerMedia)>>>,
    fail: Arc<RwLock<bool>>,
}

impl MockOwnerUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every update with a storage error while set.
    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// All successful updates, oldest first.
    pub async fn updates(&self) -> Vec<(OwnerRef, OwnerMedia)> {
        self.updates.read().await.clone()
    }

    /// Latest media written for `owner`.
    pub async fn media_for(&self, owner: &OwnerRef) -> Option<OwnerMedia> {
        self.updates
            .read()
            .await
            .iter()
            .rev()
            .find(|(o, _)| o == owner)
            .map(|(_, m)| m.clone())
    }
}

#[async_trait]
impl OwnerUpdater for MockOwnerUpdater {
    async fn set_media(&self, owner: &OwnerRef, media: &OwnerMedia) -> Result<(), OwnerError> {
        if *self.fail.read().await {
            return Err(OwnerError::Storage("mock owner store unavailable".to_string()));
        }
        self.updates
            .write()
            .await
            .push((owner.clone(), media.clone()));
        Ok(())
    }
}
