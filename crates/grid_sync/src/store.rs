//! Storage contracts for the sync subsystem.
//!
//! This module defines the traits the engine is written against. The
//! design is backend-agnostic: memory, file, or document-store backends
//! all satisfy the same contracts.
//!
//! - `CellStore`: load/save the full cell collection (a save is
//!   authoritative for the whole set; there are no partial updates).
//! - `MetadataStore`: small string scalars, independent of the cell
//!   collection blob.
//! - `LocalStore`: the on-device contract: cells plus metadata.
//! - `SupportsSync`: the version-tag bookkeeping capability. Any backend
//!   that can persist metadata scalars supports sync by construction; the
//!   engine checks for the capability through interface presence, never
//!   through the identity of a concrete backend type.
//! - `RemoteStore`: the per-principal cloud contract: cells plus a single
//!   version-tag marker. Every method fails `Unauthenticated` when no
//!   principal is signed in.

use crate::error::SyncResult;
use crate::version::VersionTag;
use grid_model::Cell;
use serde::{Deserialize, Serialize};

/// Key under which the cell collection is persisted.
pub fn cells_key(storage_key: &str) -> String {
    storage_key.to_string()
}

/// Key under which the latest local edit marker is persisted.
pub fn local_version_key(storage_key: &str) -> String {
    format!("{storage_key}_version_tag")
}

/// Key under which the last version confirmed mirrored to remote is
/// persisted.
pub fn synced_version_key(storage_key: &str) -> String {
    format!("{storage_key}_local_synced_version")
}

/// Full-collection cell persistence.
#[trait_variant::make(Send)]
pub trait CellStore {
    /// Load the full cell collection. An absent collection loads as empty.
    async fn load_cells(&self) -> SyncResult<Vec<Cell>>;

    /// Replace the full cell collection.
    async fn save_cells(&self, cells: &[Cell]) -> SyncResult<()>;
}

/// Small scalar persistence for sync bookkeeping.
#[trait_variant::make(Send)]
pub trait MetadataStore {
    async fn get_scalar(&self, key: &str) -> SyncResult<Option<String>>;

    async fn set_scalar(&self, key: &str, value: &str) -> SyncResult<()>;

    async fn remove_scalar(&self, key: &str) -> SyncResult<()>;
}

/// The on-device storage contract: cells plus metadata scalars.
pub trait LocalStore: CellStore + MetadataStore {}

impl<T: CellStore + MetadataStore> LocalStore for T {}

/// Version-tag bookkeeping over metadata scalars.
///
/// Blanket-implemented for every `MetadataStore`, so the capability is
/// carried by the interface rather than by any particular backend.
#[trait_variant::make(Send)]
pub trait SupportsSync {
    /// The latest local edit marker, if any.
    async fn local_version_tag(&self, storage_key: &str) -> SyncResult<Option<VersionTag>>;

    async fn set_local_version_tag(&self, storage_key: &str, tag: &VersionTag) -> SyncResult<()>;

    /// The last version confirmed mirrored to remote, if any.
    async fn synced_version_tag(&self, storage_key: &str) -> SyncResult<Option<VersionTag>>;

    async fn set_synced_version_tag(&self, storage_key: &str, tag: &VersionTag) -> SyncResult<()>;

    /// Remove both markers (the delete-all path).
    async fn clear_version_tags(&self, storage_key: &str) -> SyncResult<()>;
}

impl<T: MetadataStore + Sync> SupportsSync for T {
    async fn local_version_tag(&self, storage_key: &str) -> SyncResult<Option<VersionTag>> {
        Ok(self
            .get_scalar(&local_version_key(storage_key))
            .await?
            .map(VersionTag::from_string))
    }

    async fn set_local_version_tag(&self, storage_key: &str, tag: &VersionTag) -> SyncResult<()> {
        self.set_scalar(&local_version_key(storage_key), tag.as_str())
            .await
    }

    async fn synced_version_tag(&self, storage_key: &str) -> SyncResult<Option<VersionTag>> {
        Ok(self
            .get_scalar(&synced_version_key(storage_key))
            .await?
            .map(VersionTag::from_string))
    }

    async fn set_synced_version_tag(&self, storage_key: &str, tag: &VersionTag) -> SyncResult<()> {
        self.set_scalar(&synced_version_key(storage_key), tag.as_str())
            .await
    }

    async fn clear_version_tags(&self, storage_key: &str) -> SyncResult<()> {
        self.remove_scalar(&local_version_key(storage_key)).await?;
        self.remove_scalar(&synced_version_key(storage_key)).await
    }
}

/// The per-principal cloud storage contract.
///
/// Implementations namespace everything under the authenticated principal
/// and fail `Unauthenticated` when none is signed in.
#[trait_variant::make(Send)]
pub trait RemoteStore: CellStore {
    /// The remote collection's current version marker, if any.
    async fn get_version_tag(&self) -> SyncResult<Option<VersionTag>>;

    async fn set_version_tag(&self, tag: &VersionTag) -> SyncResult<()>;

    /// Remove the remote collection and its version marker.
    async fn clear(&self) -> SyncResult<()>;
}

/// The authenticated user owning a remote namespace.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Supplies the current (nullable) principal.
///
/// The host wires its real auth layer behind this; the engine only ever
/// asks "who, if anyone, is signed in right now". Hosts should call
/// `SyncEngine::handle_first_load` whenever the answer changes.
pub trait AuthProvider: Send + Sync {
    fn current_principal(&self) -> Option<Principal>;
}

/// A test/dev auth provider holding a settable principal.
#[derive(Default)]
pub struct StaticAuthProvider {
    principal: std::sync::RwLock<Option<Principal>>,
}

impl StaticAuthProvider {
    /// Create a provider with no one signed in.
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Create a provider with the given user already signed in.
    pub fn signed_in(user_id: impl Into<String>) -> Self {
        Self {
            principal: std::sync::RwLock::new(Some(Principal::new(user_id))),
        }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        *self.principal.write().unwrap() = Some(Principal::new(user_id));
    }

    pub fn sign_out(&self) {
        *self.principal.write().unwrap() = None;
    }
}

impl AuthProvider for StaticAuthProvider {
    fn current_principal(&self) -> Option<Principal> {
        self.principal.read().unwrap().clone()
    }
}
