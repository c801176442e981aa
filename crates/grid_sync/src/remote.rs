//! Remote storage: the document-store adapter.
//!
//! The cloud backend is an opaque per-user document collection with
//! list/get/put/delete semantics (`DocumentApi`). `DocumentRemoteStore`
//! adapts any such backend to the `RemoteStore` contract: one document per
//! cell, keyed by the cell id, plus one version-tag document. Every
//! operation resolves the current principal first and fails
//! `Unauthenticated` when no one is signed in.

use crate::error::{SyncError, SyncResult};
use crate::store::{AuthProvider, CellStore, Principal, RemoteStore};
use crate::version::VersionTag;
use grid_model::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// Document key of the version-tag marker inside a user namespace.
const VERSION_DOC: &str = "__version_tag";

/// An opaque per-namespace document collection.
///
/// Any document or object-storage backend satisfies this; the sync layer
/// never sees anything but strings behind keys.
#[trait_variant::make(Send)]
pub trait DocumentApi {
    /// All document keys present in a namespace.
    async fn list(&self, namespace: &str) -> SyncResult<Vec<String>>;

    async fn get(&self, namespace: &str, key: &str) -> SyncResult<Option<String>>;

    async fn put(&self, namespace: &str, key: &str, value: String) -> SyncResult<()>;

    async fn delete(&self, namespace: &str, key: &str) -> SyncResult<()>;
}

/// `RemoteStore` adapter over a `DocumentApi`.
pub struct DocumentRemoteStore<A> {
    api: Arc<A>,
    auth: Arc<dyn AuthProvider>,
}

impl<A: DocumentApi + Send + Sync> DocumentRemoteStore<A> {
    pub fn new(api: Arc<A>, auth: Arc<dyn AuthProvider>) -> Self {
        Self { api, auth }
    }

    fn principal(&self) -> SyncResult<Principal> {
        self.auth
            .current_principal()
            .ok_or(SyncError::Unauthenticated)
    }
}

impl<A: DocumentApi + Send + Sync> CellStore for DocumentRemoteStore<A> {
    async fn load_cells(&self) -> SyncResult<Vec<Cell>> {
        let principal = self.principal()?;
        let keys = self.api.list(&principal.user_id).await?;

        let mut cells = Vec::new();
        for key in keys {
            if key == VERSION_DOC {
                continue;
            }
            if let Some(json) = self.api.get(&principal.user_id, &key).await? {
                let cell: Cell = serde_json::from_str(&json)?;
                cells.push(cell);
            }
        }
        cells.sort_by_key(|c| c.id);
        Ok(cells)
    }

    async fn save_cells(&self, cells: &[Cell]) -> SyncResult<()> {
        let principal = self.principal()?;
        let existing = self.api.list(&principal.user_id).await?;

        let mut kept = HashSet::new();
        for cell in cells {
            let key = cell.id.value().to_string();
            let json = serde_json::to_string(cell)?;
            self.api.put(&principal.user_id, &key, json).await?;
            kept.insert(key);
        }

        // A save is authoritative for the full set: drop documents for
        // cells that no longer exist.
        for key in existing {
            if key != VERSION_DOC && !kept.contains(&key) {
                self.api.delete(&principal.user_id, &key).await?;
            }
        }
        Ok(())
    }
}

impl<A: DocumentApi + Send + Sync> RemoteStore for DocumentRemoteStore<A> {
    async fn get_version_tag(&self) -> SyncResult<Option<VersionTag>> {
        let principal = self.principal()?;
        Ok(self
            .api
            .get(&principal.user_id, VERSION_DOC)
            .await?
            .map(VersionTag::from_string))
    }

    async fn set_version_tag(&self, tag: &VersionTag) -> SyncResult<()> {
        let principal = self.principal()?;
        self.api
            .put(&principal.user_id, VERSION_DOC, tag.as_str().to_string())
            .await
    }

    async fn clear(&self) -> SyncResult<()> {
        let principal = self.principal()?;
        let keys = self.api.list(&principal.user_id).await?;
        for key in keys {
            self.api.delete(&principal.user_id, &key).await?;
        }
        Ok(())
    }
}

/// In-memory `DocumentApi` for tests and development.
///
/// The failure switch makes every operation return a `Network` error,
/// which the push-retry tests use to simulate an unreachable backend.
#[derive(Default)]
pub struct MemoryDocumentApi {
    namespaces: RwLock<HashMap<String, BTreeMap<String, String>>>,
    failing: AtomicBool,
}

impl MemoryDocumentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle simulated unavailability.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of documents in a namespace (version doc included).
    pub fn document_count(&self, namespace: &str) -> usize {
        self.namespaces
            .read()
            .unwrap()
            .get(namespace)
            .map(|docs| docs.len())
            .unwrap_or(0)
    }

    fn check_available(&self) -> SyncResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SyncError::Network("remote store unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl DocumentApi for MemoryDocumentApi {
    async fn list(&self, namespace: &str) -> SyncResult<Vec<String>> {
        self.check_available()?;
        Ok(self
            .namespaces
            .read()
            .unwrap()
            .get(namespace)
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn get(&self, namespace: &str, key: &str) -> SyncResult<Option<String>> {
        self.check_available()?;
        Ok(self
            .namespaces
            .read()
            .unwrap()
            .get(namespace)
            .and_then(|docs| docs.get(key).cloned()))
    }

    async fn put(&self, namespace: &str, key: &str, value: String) -> SyncResult<()> {
        self.check_available()?;
        self.namespaces
            .write()
            .unwrap()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> SyncResult<()> {
        self.check_available()?;
        if let Some(docs) = self.namespaces.write().unwrap().get_mut(namespace) {
            docs.remove(key);
        }
        Ok(())
    }
}
