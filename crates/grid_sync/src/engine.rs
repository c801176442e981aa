//! The reconciliation engine.
//!
//! `SyncEngine` orchestrates the offline-first state machine:
//!
//! - On startup it loads the local collection; on login it compares the
//!   three version markers and decides to pull, push, or prompt.
//! - On every local mutation it persists through the debounced writer,
//!   stamps a fresh version tag, and opportunistically pushes.
//! - Pushes are aggressive: full-collection, last-writer-wins, no remote
//!   pre-check. Failed pushes are retried by a periodic timer.
//! - On app backgrounding the host calls `flush_for_background`, which
//!   bypasses the debounce window before the OS can kill the process.
//!
//! Pushes and the two remote marker writes are not transactional; a crash
//! between them leaves markers that the next first-load comparison detects
//! and heals. The state machine is the recovery mechanism, not atomic
//! writes.

use crate::conflict::{ConflictMediator, ConflictPrompt, ConflictResolution};
use crate::debounce::DebouncedWriter;
use crate::error::{SyncError, SyncResult};
use crate::store::{LocalStore, RemoteStore};
use crate::version::{VersionTag, VersionTracker};
use chrono::{DateTime, Utc};
use grid_model::Cell;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Engine configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Base key under which the local store persists the collection and
    /// its version scalars.
    pub storage_key: String,
    /// Debounce quiet period for local writes, in milliseconds.
    pub debounce_ms: u64,
    /// Interval between retry attempts for still-pending pushes, in
    /// seconds.
    pub retry_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            storage_key: "grid_cells".to_string(),
            debounce_ms: 1000,
            retry_interval_secs: 30,
        }
    }
}

impl SyncConfig {
    pub fn with_storage_key(mut self, key: impl Into<String>) -> Self {
        self.storage_key = key.into();
        self
    }

    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    pub fn with_retry_interval_secs(mut self, secs: u64) -> Self {
        self.retry_interval_secs = secs;
        self
    }
}

/// State of the reconciliation machine.
///
/// `FirstLoad` is the only initial state, entered once per process and
/// once per login. `Synced` is the nominal resting state; the rest are
/// transient and resolve automatically or through the conflict prompt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncState {
    FirstLoad,
    Synced,
    LocalChanges,
    RemoteChanges,
    Conflict,
    PullingRemote,
}

/// Derived sync status for UI display. Never persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub last_modified_time: Option<DateTime<Utc>>,
    pub local_version: Option<VersionTag>,
    pub remote_version: Option<VersionTag>,
    pub has_unsaved_changes: bool,
}

impl SyncStatus {
    /// Human-readable one-liner for status surfaces.
    pub fn status_message(&self) -> String {
        match self.state {
            SyncState::Synced if self.has_unsaved_changes => "Saving...".to_string(),
            SyncState::Synced => "Up to date".to_string(),
            SyncState::FirstLoad => "Checking cloud copy...".to_string(),
            SyncState::LocalChanges => "Changes pending upload".to_string(),
            SyncState::RemoteChanges | SyncState::PullingRemote => {
                "Downloading cloud copy...".to_string()
            }
            SyncState::Conflict => "Conflict - choose which copy to keep".to_string(),
        }
    }
}

struct Inner<L, R> {
    local: Arc<L>,
    remote: Arc<R>,
    tracker: VersionTracker<L>,
    writer: DebouncedWriter<L>,
    mediator: ConflictMediator,
    /// Current collection snapshot; every operation re-reads it rather
    /// than caching, so overlapping pushes never ship stale state.
    cells: RwLock<Vec<Cell>>,
    state_tx: watch::Sender<SyncState>,
    /// Short-circuits re-entrant push attempts.
    syncing: AtomicBool,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
    last_modified_time: RwLock<Option<DateTime<Utc>>>,
    /// Last remote marker this process observed (updated on push/pull).
    known_remote: RwLock<Option<VersionTag>>,
}

impl<L, R> Inner<L, R>
where
    L: LocalStore + Send + Sync + 'static,
    R: RemoteStore + Send + Sync + 'static,
{
    fn set_state(&self, state: SyncState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            tracing::info!(?previous, current = ?state, "sync state changed");
        }
    }

    fn state(&self) -> SyncState {
        *self.state_tx.borrow()
    }

    /// Push protocol: fresh tag, full collection to remote, marker to
    /// remote, then record the tag as synced.
    async fn push(&self) -> SyncResult<()> {
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("push already in flight; skipping");
            return Ok(());
        }
        let result = self.push_inner().await;
        self.syncing.store(false, Ordering::SeqCst);

        if result.is_ok() {
            *self.last_sync_time.write().unwrap() = Some(Utc::now());
            self.set_state(SyncState::Synced);
        }
        result
    }

    async fn push_inner(&self) -> SyncResult<()> {
        let snapshot = self.cells.read().unwrap().clone();
        let tag = self.tracker.bump_local().await?;
        self.remote.save_cells(&snapshot).await?;
        self.remote.set_version_tag(&tag).await?;
        self.tracker.mark_synced(&tag).await?;
        *self.known_remote.write().unwrap() = Some(tag);
        tracing::debug!(cells = snapshot.len(), "pushed collection to remote");
        Ok(())
    }

    /// Pull protocol: fetch collection and marker, overwrite local, adopt
    /// the marker as both local and synced versions.
    async fn pull(&self) -> SyncResult<()> {
        self.set_state(SyncState::PullingRemote);
        let cells = self.remote.load_cells().await?;
        let tag = self.remote.get_version_tag().await?;
        self.local.save_cells(&cells).await?;
        self.tracker.adopt(tag.as_ref()).await?;
        tracing::debug!(cells = cells.len(), "pulled collection from remote");
        *self.cells.write().unwrap() = cells;
        *self.known_remote.write().unwrap() = tag;
        *self.last_sync_time.write().unwrap() = Some(Utc::now());
        self.set_state(SyncState::Synced);
        Ok(())
    }

    /// The first-load comparison: decide pull, push, or prompt.
    async fn handle_first_load(&self) -> SyncResult<()> {
        self.set_state(SyncState::FirstLoad);

        let remote_tag = match self.remote.get_version_tag().await {
            Ok(tag) => tag,
            Err(SyncError::Unauthenticated) => {
                tracing::info!("no authenticated principal; staying local-only");
                self.set_state(SyncState::Synced);
                return Ok(());
            }
            // Leave the state at FirstLoad so the host can retry later.
            Err(e) => return Err(e),
        };

        let synced = self.tracker.synced_version().await?;
        let has_changes = self.tracker.has_local_changes().await?;

        match (&synced, &remote_tag) {
            // Both sides fresh.
            (None, None) => self.set_state(SyncState::Synced),

            // In agreement; only local may have moved.
            (Some(local), Some(remote)) if local == remote => {
                if has_changes {
                    self.push().await?;
                } else {
                    self.set_state(SyncState::Synced);
                }
            }

            // Divergence: no synced marker with remote data present, or
            // differing markers. Tags cannot say which side is newer.
            _ => {
                if !has_changes {
                    self.set_state(SyncState::RemoteChanges);
                    self.pull().await?;
                } else {
                    let remote_cells = self.remote.load_cells().await?;
                    if remote_cells.is_empty() {
                        // Brand-new account: the conflict is spurious.
                        tracing::info!("remote collection empty; pushing local without prompting");
                        self.push().await?;
                    } else {
                        self.resolve_conflict(remote_cells).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn resolve_conflict(&self, remote_cells: Vec<Cell>) -> SyncResult<()> {
        self.set_state(SyncState::Conflict);
        let local_count = self.cells.read().unwrap().len();
        let prompt = ConflictPrompt {
            local_cells: local_count,
            remote_cells: remote_cells.len(),
            explanation: format!(
                "This device has {} cells with edits that were never uploaded, \
                 but the cloud copy ({} cells) has changed since. \
                 Choose which copy to keep; the other will be overwritten.",
                local_count,
                remote_cells.len()
            ),
        };

        match self.mediator.prompt(prompt).await? {
            ConflictResolution::KeepLocal => {
                tracing::info!("conflict resolved: keeping local copy");
                self.push().await
            }
            ConflictResolution::KeepRemote => {
                tracing::info!("conflict resolved: keeping remote copy");
                self.pull().await
            }
        }
    }
}

/// The offline-first synchronization engine.
///
/// Constructed once at process start and passed by reference to all
/// consumers; there are no ambient globals. All cell mutations flow
/// through [`SyncEngine::save_cells`].
pub struct SyncEngine<L, R> {
    inner: Arc<Inner<L, R>>,
    retry_task: Mutex<Option<JoinHandle<()>>>,
}

impl<L, R> SyncEngine<L, R>
where
    L: LocalStore + Send + Sync + 'static,
    R: RemoteStore + Send + Sync + 'static,
{
    pub fn new(local: Arc<L>, remote: Arc<R>, config: SyncConfig) -> Self {
        let tracker = VersionTracker::new(Arc::clone(&local), config.storage_key.clone());
        let writer = DebouncedWriter::new(
            Arc::clone(&local),
            Duration::from_millis(config.debounce_ms),
        );
        let (state_tx, _) = watch::channel(SyncState::FirstLoad);

        let inner = Arc::new(Inner {
            local,
            remote,
            tracker,
            writer,
            mediator: ConflictMediator::new(),
            cells: RwLock::new(Vec::new()),
            state_tx,
            syncing: AtomicBool::new(false),
            last_sync_time: RwLock::new(None),
            last_modified_time: RwLock::new(None),
            known_remote: RwLock::new(None),
        });

        let engine = Self {
            inner,
            retry_task: Mutex::new(None),
        };
        engine.start_retry_task(config.retry_interval_secs);
        engine
    }

    /// Load the local collection into memory. Call once at startup,
    /// before any mutation.
    pub async fn initialize(&self) -> SyncResult<()> {
        let cells = self.inner.local.load_cells().await?;
        tracing::info!(cells = cells.len(), "loaded local collection");
        *self.inner.cells.write().unwrap() = cells;
        self.inner.set_state(SyncState::Synced);
        Ok(())
    }

    /// Run the first-load reconciliation. Call when a user authenticates
    /// or the app starts with a cached session.
    pub async fn handle_first_load(&self) -> SyncResult<()> {
        self.inner.handle_first_load().await
    }

    /// The current cell collection.
    pub async fn load_cells(&self) -> SyncResult<Vec<Cell>> {
        Ok(self.inner.cells.read().unwrap().clone())
    }

    /// The single local-mutation entry point.
    ///
    /// Persists through the debounced writer, stamps a fresh version tag,
    /// and fires an opportunistic push. Returns once local durability is
    /// queued; push failures never surface here.
    pub async fn save_cells(&self, cells: Vec<Cell>) -> SyncResult<()> {
        {
            *self.inner.cells.write().unwrap() = cells.clone();
            *self.inner.last_modified_time.write().unwrap() = Some(Utc::now());
        }
        self.inner.writer.save(cells);
        self.inner.tracker.bump_local().await?;
        self.inner.set_state(SyncState::LocalChanges);

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.push().await {
                Ok(()) => {}
                Err(SyncError::Unauthenticated) => {
                    tracing::debug!("not signed in; changes stay local until login");
                }
                Err(e) => tracing::warn!("opportunistic push failed: {e}"),
            }
        });
        Ok(())
    }

    /// Push now if local changes are pending. Used by the retry timer and
    /// by hosts that want an awaitable sync point.
    pub async fn sync_now(&self) -> SyncResult<()> {
        if self.inner.tracker.has_local_changes().await? {
            self.inner.push().await
        } else {
            Ok(())
        }
    }

    /// Force-flush the debounced write and attempt a push. Call on app
    /// backgrounding, before the OS can terminate the process.
    ///
    /// The local flush is awaited and its failure propagated; the push is
    /// best-effort.
    pub async fn flush_for_background(&self) -> SyncResult<()> {
        self.inner.writer.force_flush().await?;
        if self.inner.tracker.has_local_changes().await? {
            match self.inner.push().await {
                Ok(()) => {}
                Err(SyncError::Unauthenticated) => {}
                Err(e) => tracing::warn!("background push failed: {e}"),
            }
        }
        Ok(())
    }

    /// Delete every cell everywhere and reset all version markers.
    pub async fn delete_all(&self) -> SyncResult<()> {
        self.inner.cells.write().unwrap().clear();
        self.inner.writer.save(Vec::new());
        self.inner.writer.force_flush().await?;
        self.inner.tracker.clear().await?;

        match self.inner.remote.clear().await {
            Ok(()) => {}
            Err(SyncError::Unauthenticated) => {
                tracing::debug!("not signed in; cleared local copy only");
            }
            Err(e) => tracing::warn!("failed to clear remote collection: {e}"),
        }
        *self.inner.known_remote.write().unwrap() = None;
        self.inner.set_state(SyncState::Synced);
        Ok(())
    }

    /// Register the host UI's conflict prompt handler.
    pub fn set_conflict_prompt_handler<F>(&self, handler: F)
    where
        F: Fn(ConflictPrompt, oneshot::Sender<ConflictResolution>) + Send + Sync + 'static,
    {
        self.inner.mediator.set_prompt_handler(handler);
    }

    /// Whether a push is currently in flight.
    pub fn is_syncing(&self) -> bool {
        self.inner.syncing.load(Ordering::SeqCst)
    }

    /// Watch the state machine. Receivers see every transition.
    pub fn subscribe_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    /// Derived status snapshot for UI display.
    pub async fn sync_status(&self) -> SyncResult<SyncStatus> {
        let local_version = self.inner.tracker.local_version().await?;
        let has_unsaved =
            self.inner.writer.has_pending() || self.inner.tracker.has_local_changes().await?;
        Ok(SyncStatus {
            state: self.inner.state(),
            last_sync_time: *self.inner.last_sync_time.read().unwrap(),
            last_modified_time: *self.inner.last_modified_time.read().unwrap(),
            local_version,
            remote_version: self.inner.known_remote.read().unwrap().clone(),
            has_unsaved_changes: has_unsaved,
        })
    }

    fn start_retry_task(&self, interval_secs: u64) {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the timer
            // never races startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match inner.tracker.has_local_changes().await {
                    Ok(true) => {
                        tracing::debug!("retrying pending push");
                        match inner.push().await {
                            Ok(()) => {}
                            Err(SyncError::Unauthenticated) => {}
                            Err(e) => tracing::warn!("retry push failed: {e}"),
                        }
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!("could not read version markers: {e}"),
                }
            }
        });
        *self.retry_task.lock().unwrap() = Some(handle);
    }

    /// Cancel the periodic retry task. Also runs on drop.
    pub fn shutdown(&self) {
        if let Some(handle) = self.retry_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl<L, R> Drop for SyncEngine<L, R> {
    fn drop(&mut self) {
        if let Some(handle) = self.retry_task.lock().unwrap().take() {
            handle.abort();
        }
    }
}
