//! The conflict decision point.
//!
//! When local and remote have diverged unknowably, the engine cannot pick
//! a side: version tags are fingerprints, not clocks, so neither copy is
//! provably newer. `ConflictMediator` suspends the state machine and hands
//! the choice to the host UI through an injected handler. The handler
//! receives the prompt plus a one-shot responder and answers whenever the
//! user decides; there is no timeout. Waiting beats guessing.

use crate::error::{SyncError, SyncResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use tokio::sync::oneshot;

/// The user's choice between the two diverged copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Keep the local copy; overwrite remote (push).
    KeepLocal,
    /// Keep the remote copy; overwrite local (pull).
    KeepRemote,
}

/// What the host UI shows the user when asking for a decision.
#[derive(Clone, Debug)]
pub struct ConflictPrompt {
    pub local_cells: usize,
    pub remote_cells: usize,
    pub explanation: String,
}

/// Injected UI callback: receives the prompt and a responder to answer
/// through.
pub type PromptHandler =
    Box<dyn Fn(ConflictPrompt, oneshot::Sender<ConflictResolution>) + Send + Sync>;

/// Single-shot async decision point between the engine and the host UI.
///
/// Holds at most one outstanding prompt: a second conflict arriving while
/// one is pending is rejected with `PromptPending` rather than silently
/// dropped or queued.
#[derive(Default)]
pub struct ConflictMediator {
    handler: RwLock<Option<PromptHandler>>,
    pending: AtomicBool,
}

impl ConflictMediator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the host UI's prompt handler, replacing any previous one.
    pub fn set_prompt_handler<F>(&self, handler: F)
    where
        F: Fn(ConflictPrompt, oneshot::Sender<ConflictResolution>) + Send + Sync + 'static,
    {
        *self.handler.write().unwrap() = Some(Box::new(handler));
    }

    /// Whether a prompt is currently awaiting an answer.
    pub fn has_pending_prompt(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Present a conflict and suspend until it is resolved.
    ///
    /// With no handler registered the mediator resolves `KeepLocal` (local
    /// edits are never silently discarded) and logs a warning. The same
    /// fallback applies if the handler drops the responder unanswered.
    pub async fn prompt(&self, prompt: ConflictPrompt) -> SyncResult<ConflictResolution> {
        if self.pending.swap(true, Ordering::SeqCst) {
            return Err(SyncError::PromptPending);
        }
        let result = self.prompt_inner(prompt).await;
        self.pending.store(false, Ordering::SeqCst);
        Ok(result)
    }

    async fn prompt_inner(&self, prompt: ConflictPrompt) -> ConflictResolution {
        let receiver = {
            let guard = self.handler.read().unwrap();
            match guard.as_ref() {
                Some(handler) => {
                    let (tx, rx) = oneshot::channel();
                    handler(prompt, tx);
                    Some(rx)
                }
                None => None,
            }
        };

        match receiver {
            None => {
                tracing::warn!(
                    "conflict detected but no prompt handler registered; keeping local edits"
                );
                ConflictResolution::KeepLocal
            }
            Some(rx) => match rx.await {
                Ok(resolution) => resolution,
                Err(_) => {
                    tracing::warn!(
                        "conflict prompt was dropped without an answer; keeping local edits"
                    );
                    ConflictResolution::KeepLocal
                }
            },
        }
    }
}
