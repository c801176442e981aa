//! Write coalescing for the local store.
//!
//! Rapid edits (typing, dragging) would otherwise hit disk on every
//! keystroke. `DebouncedWriter` keeps only the latest pending payload and
//! persists it after a quiet period; each incoming save replaces the
//! payload and restarts the window, so exactly one write lands per burst
//! and it always carries the newest state. `force_flush` bypasses the
//! window for process-suspend paths where the OS may kill us next.

use crate::error::SyncResult;
use crate::store::CellStore;
use grid_model::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Debouncing wrapper around a `CellStore`'s save operation.
pub struct DebouncedWriter<S> {
    store: Arc<S>,
    window: Duration,
    pending: Arc<Mutex<Option<Vec<Cell>>>>,
    // Bumped on every save and flush; a timer only fires if its generation
    // is still current, so superseded timers become no-ops.
    generation: Arc<AtomicU64>,
}

impl<S: CellStore + Send + Sync + 'static> DebouncedWriter<S> {
    /// Create a writer with the given quiet period.
    pub fn new(store: Arc<S>, window: Duration) -> Self {
        Self {
            store,
            window,
            pending: Arc::new(Mutex::new(None)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue a payload for persistence after the quiet period.
    ///
    /// Replaces any earlier pending payload; only the last payload within
    /// a window reaches the store. Returns immediately.
    pub fn save(&self, cells: Vec<Cell>) {
        *self.pending.lock().unwrap() = Some(cells);
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let store = Arc::clone(&self.store);
        let pending = Arc::clone(&self.pending);
        let current = Arc::clone(&self.generation);
        let window = self.window;

        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if current.load(Ordering::SeqCst) != generation {
                // A newer save or a flush superseded this timer.
                return;
            }
            let payload = pending.lock().unwrap().take();
            if let Some(cells) = payload {
                if let Err(e) = store.save_cells(&cells).await {
                    tracing::warn!("debounced save failed: {e}");
                    // Keep the payload pending so a later flush can retry,
                    // unless a newer save already replaced it.
                    let mut slot = pending.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(cells);
                    }
                }
            }
        });
    }

    /// Persist any pending payload immediately, cancelling the window.
    ///
    /// Idempotent: a no-op when nothing is pending. Must complete before
    /// the host hands control back to the OS on suspend.
    pub async fn force_flush(&self) -> SyncResult<()> {
        self.generation.fetch_add(1, Ordering::SeqCst);
        let payload = self.pending.lock().unwrap().take();
        if let Some(cells) = payload {
            self.store.save_cells(&cells).await?;
        }
        Ok(())
    }

    /// Whether a payload is waiting for its window to elapse.
    pub fn has_pending(&self) -> bool {
        self.pending.lock().unwrap().is_some()
    }
}
