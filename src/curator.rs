//! Tag curation session.
//!
//! [`Curator`] ties together the in-memory [`TagStore`], the
//! [`DirtyTracker`], the persisted state, and the backend. Every mutation
//! follows the same path:
//!
//! ```text
//! apply to TagStore ──▶ mark tracker ──▶ write tagState + tagDirty
//! ```
//!
//! and [`Curator::save`] pushes the active ranking to the backend as a
//! custom analysis.
//!
//! The tag store lock is never held across an `.await`; the save guard is
//! the only thing that spans a suspension point.

use anyhow::Result;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};

use history_curator_core::models::{format_iso_millis, AnalysisSnapshot, SessionSnapshot, Tag};
use history_curator_core::store::{get_json, get_or, keys, StateStore};
use history_curator_core::sync_state::{DirtyTracker, SaveState};
use history_curator_core::tags::{LoadSource, TagStore};

use crate::gateway::{Ack, Backend, CustomAnalysisPayload};

/// One row of the ranked tag list.
#[derive(Debug, Clone, PartialEq)]
pub struct TagRow {
    pub rank: usize,
    pub id: String,
    pub path: String,
    pub count: u64,
    pub ratio: f64,
}

pub struct Curator {
    store: Arc<dyn StateStore>,
    backend: Arc<dyn Backend>,
    tags: Mutex<TagStore>,
    tracker: DirtyTracker,
}

impl Curator {
    pub fn new(store: Arc<dyn StateStore>, backend: Arc<dyn Backend>) -> Self {
        Self {
            store,
            backend,
            tags: Mutex::new(TagStore::new()),
            tracker: DirtyTracker::new(),
        }
    }

    fn tags(&self) -> MutexGuard<'_, TagStore> {
        self.tags.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the latest analysis, replacing local edits. Falls back to the
    /// stored session when there is no analysis summary.
    pub async fn open(&self) -> Result<LoadSource> {
        let analysis: Option<AnalysisSnapshot> =
            get_json(self.store.as_ref(), keys::PYTHON_ANALYSIS).await?;
        let session: Option<SessionSnapshot> =
            get_json(self.store.as_ref(), keys::TAG_STATE).await?;

        let source = self
            .tags()
            .load_from_backend_snapshot(analysis.as_ref(), session.as_ref());
        self.finish_load(source).await?;
        Ok(source)
    }

    /// Same as [`open`](Self::open); used by the explicit refresh action.
    pub async fn refresh(&self) -> Result<LoadSource> {
        self.open().await
    }

    /// Continue the stored session, including its unsaved flag. Falls back
    /// to the latest analysis when no session was stored.
    pub async fn resume(&self) -> Result<LoadSource> {
        let session: Option<SessionSnapshot> =
            get_json(self.store.as_ref(), keys::TAG_STATE).await?;
        let analysis: Option<AnalysisSnapshot> =
            get_json(self.store.as_ref(), keys::PYTHON_ANALYSIS).await?;

        let source = self
            .tags()
            .load_from_local_session(session.as_ref(), analysis.as_ref());
        self.finish_load(source).await?;
        Ok(source)
    }

    async fn finish_load(&self, source: LoadSource) -> Result<()> {
        match source {
            LoadSource::Backend => {
                self.tracker.reset_saved();
                self.persist().await?;
            }
            LoadSource::LocalSession => {
                let carried = get_or(self.store.as_ref(), keys::TAG_DIRTY, false).await?;
                self.tracker.finish_local_load(carried);
            }
            LoadSource::Empty => self.tracker.finish_local_load(false),
        }
        tracing::debug!(?source, state = self.tracker.state().label(), "tags loaded");
        Ok(())
    }

    /// Write the session snapshot and the unsaved flag.
    async fn persist(&self) -> Result<()> {
        let snapshot = self.tags().snapshot(format_iso_millis(chrono::Utc::now()));
        let dirty = self.tracker.has_unsaved_changes();
        self.store
            .set_many(vec![
                (keys::TAG_STATE.to_string(), serde_json::to_value(&snapshot)?),
                (keys::TAG_DIRTY.to_string(), json!(dirty)),
            ])
            .await
    }

    async fn record_mutation(&self) -> Result<SaveState> {
        let state = self.tracker.mark_unsaved();
        self.persist().await?;
        Ok(state)
    }

    /// Delete an active tag. An unknown id changes nothing but still
    /// counts as an edit.
    pub async fn delete_tag(&self, id: &str) -> Result<bool> {
        let moved = self.tags().delete_tag(id);
        if moved {
            tracing::info!(id, "tag deleted");
        }
        self.record_mutation().await?;
        Ok(moved)
    }

    pub async fn restore_tag(&self, id: &str) -> Result<bool> {
        let moved = self.tags().restore_tag(id);
        if moved {
            tracing::info!(id, "tag restored");
            self.record_mutation().await?;
        }
        Ok(moved)
    }

    /// Add a user-defined tag. Blank labels are ignored.
    pub async fn add_custom_tag(&self, label: &str) -> Result<Option<Tag>> {
        let added = self.tags().add_custom_tag(label).cloned();
        if let Some(tag) = &added {
            tracing::info!(id = %tag.id, path = %tag.path, count = tag.count, "custom tag added");
            self.record_mutation().await?;
        }
        Ok(added)
    }

    pub fn begin_drag(&self, id: &str) -> bool {
        self.tags().begin_drag(id)
    }

    pub fn drag_to(&self, new_count: i64) -> Option<u64> {
        self.tags().drag_to(new_count)
    }

    pub fn drag_to_ratio(&self, ratio: f64) -> Option<u64> {
        self.tags().drag_to_ratio(ratio)
    }

    /// Finish a drag, re-rank, and record the edit.
    pub async fn end_drag(&self) -> Result<bool> {
        let ended = self.tags().end_drag();
        if ended {
            self.record_mutation().await?;
        }
        Ok(ended)
    }

    /// Abandon a drag. The tag gets its starting count back, so there is
    /// nothing to persist.
    pub fn cancel_drag(&self) {
        self.tags().cancel_drag();
    }

    /// Set a tag's count in one step. Returns the applied (clamped) count.
    pub async fn reorder_by_drag(&self, id: &str, new_count: i64) -> Result<Option<u64>> {
        let applied = self.tags().reorder_by_drag(id, new_count);
        if let Some(count) = applied {
            tracing::info!(id, count, "tag re-ranked");
            self.record_mutation().await?;
        }
        Ok(applied)
    }

    /// Push the active ranking to the backend.
    ///
    /// Returns `None` without contacting the backend when there is nothing
    /// to save, a save is already in flight, or no analysis has been stored
    /// yet.
    pub async fn save(&self) -> Result<Option<Ack>> {
        let Some(guard) = self.tracker.try_begin_save() else {
            return Ok(None);
        };

        let analysis: Option<AnalysisSnapshot> =
            get_json(self.store.as_ref(), keys::PYTHON_ANALYSIS).await?;
        let Some(analysis) = analysis else {
            tracing::error!("cannot save tags: no analysis result stored");
            drop(guard);
            return Ok(None);
        };

        let summary = self.tags().summary();
        let payload = CustomAnalysisPayload {
            total_count: analysis.total_count.unwrap_or(0),
            total_analyzed: summary.len() as u64,
            settings: analysis.settings.unwrap_or_else(|| json!({})),
            summary,
        };

        let ack = self.backend.save_custom_analysis(&payload).await;
        let state = guard.complete(ack.ok);
        if ack.ok {
            tracing::info!(tags = payload.summary.len(), state = state.label(), "tags saved");
        } else {
            tracing::warn!(error = ?ack.err, "tag save failed");
        }

        self.store
            .set(keys::TAG_DIRTY, json!(self.tracker.has_unsaved_changes()))
            .await?;
        Ok(Some(ack))
    }

    pub fn state(&self) -> SaveState {
        self.tracker.state()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.tracker.has_unsaved_changes()
    }

    pub fn active(&self) -> Vec<Tag> {
        self.tags().active().to_vec()
    }

    pub fn deleted(&self) -> Vec<Tag> {
        self.tags().deleted().to_vec()
    }

    pub fn ranked(&self) -> Vec<TagRow> {
        self.tags()
            .ranked()
            .into_iter()
            .map(|row| TagRow {
                rank: row.rank,
                id: row.tag.id.clone(),
                path: row.tag.path.clone(),
                count: row.tag.count,
                ratio: row.ratio,
            })
            .collect()
    }

    /// Find a tag id by exact id or by label. Labels match active tags
    /// before deleted ones.
    pub fn resolve(&self, id_or_label: &str) -> Option<String> {
        let tags = self.tags();
        let all = || tags.active().iter().chain(tags.deleted().iter());
        all()
            .find(|t| t.id == id_or_label)
            .or_else(|| all().find(|t| t.path == id_or_label))
            .map(|t| t.id.clone())
    }
}
