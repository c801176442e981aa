//! Version tags and the tracker that compares them.
//!
//! A version tag is an opaque change-fingerprint: wall-clock millis plus a
//! random suffix so two saves in the same millisecond still get distinct
//! tags. Tags are compared only for equality. They are not a logical
//! clock: comparing two tags can tell you *that* the sides differ, never
//! *which* side is newer.

use crate::error::SyncResult;
use crate::store::{MetadataStore, SupportsSync};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque fingerprint of a point-in-time state of the cell collection.
///
/// Deliberately carries no `Ord`/`PartialOrd`: ordering two tags is
/// meaningless.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionTag(String);

impl VersionTag {
    /// Generate a fresh tag: `"{unix_millis}-{8 random hex chars}"`.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{}-{}", millis, &suffix[..8]))
    }

    /// Reconstruct a tag from its persisted string form.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maintains the three identifiers that drive all sync decisions:
/// the latest local edit marker, the last version confirmed mirrored to
/// remote, and (read elsewhere) the remote's current marker.
pub struct VersionTracker<M> {
    store: Arc<M>,
    storage_key: String,
}

impl<M> Clone for VersionTracker<M> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            storage_key: self.storage_key.clone(),
        }
    }
}

impl<M: MetadataStore + Send + Sync> VersionTracker<M> {
    pub fn new(store: Arc<M>, storage_key: impl Into<String>) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
        }
    }

    /// Generate and persist a fresh tag as the local edit marker, marking
    /// local state as ahead.
    pub async fn bump_local(&self) -> SyncResult<VersionTag> {
        let tag = VersionTag::generate();
        self.store
            .set_local_version_tag(&self.storage_key, &tag)
            .await?;
        Ok(tag)
    }

    /// Persist `tag` as the last version confirmed mirrored to remote.
    pub async fn mark_synced(&self, tag: &VersionTag) -> SyncResult<()> {
        self.store
            .set_synced_version_tag(&self.storage_key, tag)
            .await
    }

    /// Adopt a remote marker as both local and synced versions (the pull
    /// path). A missing marker clears both.
    pub async fn adopt(&self, tag: Option<&VersionTag>) -> SyncResult<()> {
        match tag {
            Some(tag) => {
                self.store
                    .set_local_version_tag(&self.storage_key, tag)
                    .await?;
                self.store
                    .set_synced_version_tag(&self.storage_key, tag)
                    .await
            }
            None => self.clear().await,
        }
    }

    pub async fn local_version(&self) -> SyncResult<Option<VersionTag>> {
        self.store.local_version_tag(&self.storage_key).await
    }

    pub async fn synced_version(&self) -> SyncResult<Option<VersionTag>> {
        self.store.synced_version_tag(&self.storage_key).await
    }

    /// Whether local state has moved since the last confirmed mirror.
    ///
    /// Null versus set counts as a change; null versus null does not.
    pub async fn has_local_changes(&self) -> SyncResult<bool> {
        let local = self.local_version().await?;
        let synced = self.synced_version().await?;
        Ok(local != synced)
    }

    /// Remove both markers (the delete-all path).
    pub async fn clear(&self) -> SyncResult<()> {
        self.store.clear_version_tags(&self.storage_key).await
    }
}
