//! Cancellation plumbing for in-flight transcription runs.
//!
//! The delete endpoint must be able to stop a run before it writes into a
//! record that no longer exists (or whose id has been reused). Each run
//! registers itself here under its voice note id; deleting the note cancels
//! the matching token, and the run checks it before every store write and
//! while waiting between polls.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

/// Receiver half handed to a run.
#[derive(Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves when the token is cancelled; pends forever if the run's
    /// registry entry is gone (the run is finishing anyway).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Registry of in-flight runs keyed by voice note id.
#[derive(Default)]
pub struct RunRegistry {
    runs: Mutex<HashMap<i64, watch::Sender<bool>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a run and get its cancellation token. A second registration
    /// for the same id replaces (and implicitly cancels) the first.
    pub fn register(&self, note_id: i64) -> CancelToken {
        let (tx, rx) = watch::channel(false);
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = runs.insert(note_id, tx) {
            let _ = previous.send(true);
        }
        CancelToken { rx }
    }

    /// Cancel the run for a note, if one is in flight.
    pub fn cancel(&self, note_id: i64) -> bool {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        match runs.remove(&note_id) {
            Some(tx) => {
                debug!(note_id, "Cancelling in-flight transcription run");
                let _ = tx.send(true);
                true
            }
            None => false,
        }
    }

    /// Drop a finished run's entry.
    pub fn finish(&self, note_id: i64) {
        let mut runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
        runs.remove(&note_id);
    }

    pub fn in_flight(&self) -> usize {
        self.runs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
