//! Save-state tracking for curated tags.
//!
//! [`DirtyTracker`] answers one question: do the local tag collections
//! differ from what the backend last acknowledged? It moves through
//!
//! ```text
//!            mutation                 try_begin_save
//!   Saved ─────────────▶ Unsaved ─────────────────────▶ Saving
//!     ▲                     ▲                             │
//!     │  ack ok             │  ack failed / dropped       │
//!     └─────────────────────┴─────────────────────────────┘
//! ```
//!
//! At most one save is in flight: [`DirtyTracker::try_begin_save`] checks
//! and sets the guard in one synchronous step and hands back a
//! [`SaveGuard`]. The guard is released by [`SaveGuard::complete`], or on
//! drop (treated as a failed save), so a cancelled save future can never
//! leave the tracker stuck in `Saving`.

use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Saved,
    Unsaved,
    Saving,
}

impl SaveState {
    pub fn label(&self) -> &'static str {
        match self {
            SaveState::Saved => "Saved",
            SaveState::Unsaved => "Unsaved",
            SaveState::Saving => "Saving...",
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    dirty: bool,
    in_flight: bool,
    loaded: bool,
    edited_during_save: bool,
    /// Bumped by every reset; a save that started under an older epoch
    /// does not touch the dirty bit when it finishes.
    epoch: u64,
}

impl Inner {
    fn state(&self) -> SaveState {
        if self.in_flight {
            SaveState::Saving
        } else if self.dirty {
            SaveState::Unsaved
        } else {
            SaveState::Saved
        }
    }
}

#[derive(Debug, Default)]
pub struct DirtyTracker {
    inner: Mutex<Inner>,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock still holds a consistent Inner; every update is
        // a handful of field writes.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> SaveState {
        self.lock().state()
    }

    /// True while there are edits the backend has not acknowledged.
    pub fn has_unsaved_changes(&self) -> bool {
        self.lock().dirty
    }

    /// Initial load or backend refresh: local state now equals the backend
    /// snapshot.
    pub fn reset_saved(&self) {
        let mut inner = self.lock();
        inner.loaded = true;
        inner.dirty = false;
        inner.edited_during_save = false;
        inner.epoch += 1;
    }

    /// Initial load from the local session. Enables mutation tracking and
    /// takes the dirty bit carried over from an earlier session.
    pub fn finish_local_load(&self, carried_dirty: bool) {
        let mut inner = self.lock();
        inner.loaded = true;
        inner.dirty = carried_dirty;
    }

    /// Record a mutation. Ignored before the initial load.
    pub fn mark_unsaved(&self) -> SaveState {
        let mut inner = self.lock();
        if inner.loaded {
            inner.dirty = true;
            if inner.in_flight {
                inner.edited_during_save = true;
            }
        }
        inner.state()
    }

    /// Enter `Saving` if there is something to save and no save is in
    /// flight.
    pub fn try_begin_save(&self) -> Option<SaveGuard<'_>> {
        let mut inner = self.lock();
        if inner.in_flight || !inner.dirty {
            return None;
        }
        inner.in_flight = true;
        inner.edited_during_save = false;
        let epoch = inner.epoch;
        drop(inner);
        Some(SaveGuard {
            tracker: self,
            epoch,
            done: false,
        })
    }

    fn finish(&self, epoch: u64, ok: bool) -> SaveState {
        let mut inner = self.lock();
        inner.in_flight = false;
        if inner.epoch == epoch {
            inner.dirty = if ok { inner.edited_during_save } else { true };
        }
        inner.edited_during_save = false;
        inner.state()
    }
}

/// Proof that a save is in flight. Exactly one exists at a time.
#[derive(Debug)]
pub struct SaveGuard<'a> {
    tracker: &'a DirtyTracker,
    epoch: u64,
    done: bool,
}

impl SaveGuard<'_> {
    /// Apply the backend acknowledgment and release the guard.
    pub fn complete(mut self, ok: bool) -> SaveState {
        self.done = true;
        self.tracker.finish(self.epoch, ok)
    }
}

impl Drop for SaveGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.tracker.finish(self.epoch, false);
        }
    }
}
