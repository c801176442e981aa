//! Error types for the sync crate.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during synchronization.
///
/// The taxonomy mirrors the propagation policy: `Storage` failures are
/// fatal to the operation that requested durability and propagate to the
/// caller; `Network` failures are swallowed at the fire-and-forget push
/// boundary and recovered by the periodic retry; `Unauthenticated` is
/// surfaced and never retried. An unresolved conflict is a suspended
/// state, not an error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// A remote operation was attempted with no authenticated principal.
    #[error("No authenticated principal for remote operation")]
    Unauthenticated,

    /// Local read/write failure.
    #[error("Local storage failure: {0}")]
    Storage(String),

    /// Remote read/write failure.
    #[error("Remote store failure: {0}")]
    Network(String),

    /// JSON encode/decode failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A second conflict arrived while a prompt was already outstanding.
    #[error("A conflict prompt is already pending")]
    PromptPending,
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}
