//! Offline-first synchronization for the productivity grid.
//!
//! Grid state lives on the device first: every mutation is persisted
//! locally (debounced) and stamped with an opaque version tag, then pushed
//! opportunistically to a per-user cloud document collection. On startup
//! and login the engine compares the local, synced, and remote tags to
//! decide whether to pull, push, or ask the user to resolve a genuine
//! conflict.
//!
//! # Modules
//!
//! - `engine`: the reconciliation state machine and mutation entry point
//! - `version`: version tags and the tracker comparing them
//! - `store`: storage contracts (local, remote, metadata, auth)
//! - `local`: on-device backends (file and in-memory)
//! - `remote`: the document-store adapter and its in-memory backend
//! - `debounce`: write coalescing for rapid edits
//! - `conflict`: the suspended user decision point
//! - `error`: the sync error taxonomy
//!
//! # Example
//!
//! ```
//! use grid_sync::{MemoryDocumentApi, DocumentRemoteStore, MemoryLocalStore,
//!                 StaticAuthProvider, SyncConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let local = Arc::new(MemoryLocalStore::new());
//! let auth = Arc::new(StaticAuthProvider::signed_in("user-1"));
//! let remote = Arc::new(DocumentRemoteStore::new(
//!     Arc::new(MemoryDocumentApi::new()),
//!     auth,
//! ));
//!
//! let engine = SyncEngine::new(local, remote, SyncConfig::default());
//! engine.initialize().await.unwrap();
//! engine.handle_first_load().await.unwrap();
//! assert!(engine.load_cells().await.unwrap().is_empty());
//! # }
//! ```

pub mod conflict;
pub mod debounce;
pub mod engine;
pub mod error;
pub mod local;
pub mod remote;
pub mod store;
pub mod version;

// Re-export commonly used types
pub use conflict::{ConflictMediator, ConflictPrompt, ConflictResolution, PromptHandler};
pub use debounce::DebouncedWriter;
pub use engine::{SyncConfig, SyncEngine, SyncState, SyncStatus};
pub use error::{SyncError, SyncResult};
pub use local::{FileLocalStore, MemoryLocalStore};
pub use remote::{DocumentApi, DocumentRemoteStore, MemoryDocumentApi};
pub use store::{
    cells_key, local_version_key, synced_version_key, AuthProvider, CellStore, LocalStore,
    MetadataStore, Principal, RemoteStore, StaticAuthProvider, SupportsSync,
};
pub use version::{VersionTag, VersionTracker};
